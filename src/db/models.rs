use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned when a string does not name a variant of a stored enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Enums stored in SQLite as their SCREAMING_SNAKE_CASE names.
///
/// Parsing is case-insensitive and treats spaces and hyphens as underscores,
/// so `"second home"` and `"Second-Home"` both resolve to `SECOND_HOME`.
macro_rules! stored_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Comma separated list of every accepted name.
            pub fn valid_names() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == normalized)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

stored_enum!(ChatMessageRole, "message role", {
    User => "USER",
    Ai => "AI",
});

stored_enum!(OccupancyType, "occupancy", {
    Primary => "PRIMARY",
    SecondHome => "SECOND_HOME",
    Investment => "INVESTMENT",
    Investor => "INVESTOR",
});

stored_enum!(LoanPurposeType, "loan purpose", {
    Purchase => "PURCHASE",
    RateTerm => "RATE_TERM",
    CashOut => "CASH_OUT",
    SecondLien => "SECOND_LIEN",
});

stored_enum!(GuidelineCategory, "category", {
    LoanPurpose => "LOAN_PURPOSE",
    Exceptions => "EXCEPTIONS",
    PrepaymentPenalty => "PREPAYMENT_PENALTY",
    ProductTypes => "PRODUCT_TYPES",
    InterestOnly => "INTEREST_ONLY",
    LoanAmounts => "LOAN_AMOUNTS",
    Occupancy => "OCCUPANCY",
    PropertyTypes => "PROPERTY_TYPES",
    PropertyRestrictions => "PROPERTY_RESTRICTIONS",
    CashOut => "CASH_OUT",
    Acreage => "ACREAGE",
    Appraisals => "APPRAISALS",
    DecliningMarket => "DECLINING_MARKET",
    Tradelines => "TRADELINES",
    HousingHistory => "HOUSING_HISTORY",
    CreditEventSeasoning => "CREDIT_EVENT_SEASONING",
    Reserves => "RESERVES",
    SellerConcessions => "SELLER_CONCESSIONS",
    GiftFunds => "GIFT_FUNDS",
    SubordinateFinancing => "SUBORDINATE_FINANCING",
    Citizenship => "CITIZENSHIP",
    HomeownerEducation => "HOMEOWNER_EDUCATION",
    IneligibleStates => "INELIGIBLE_STATES",
    IneligibleLocations => "INELIGIBLE_LOCATIONS",
    GeographicRestrictions => "GEOGRAPHIC_RESTRICTIONS",
    FirstTimeInvestor => "FIRST_TIME_INVESTOR",
    FirstTimeHomebuyer => "FIRST_TIME_HOMEBUYER",
    IncomeDocumentation => "INCOME_DOCUMENTATION",
    Dti => "DTI",
    AssetUtilization => "ASSET_UTILIZATION",
    StateSpecific => "STATE_SPECIFIC",
    Escrows => "ESCROWS",
    SecondaryFinancing => "SECONDARY_FINANCING",
    BorrowerEligibility => "BORROWER_ELIGIBILITY",
    NonArmLength => "NON_ARM_LENGTH",
    DelayedFinancing => "DELAYED_FINANCING",
    LeasePurchase => "LEASE_PURCHASE",
    DuRules => "DU_RULES",
    ItinSpecifics => "ITIN_SPECIFICS",
    DscrHighlights => "DSCR_HIGHLIGHTS",
    SecondLienLimits => "SECOND_LIEN_LIMITS",
    DscrMultiRules => "DSCR_MULTI_RULES",
    DscrRules => "DSCR_RULES",
    Miscellaneous => "MISCELLANEOUS",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: ChatMessageRole,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lender {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanProgram {
    pub id: String,
    pub lender_id: String,
    pub name: String,
    pub program_code: Option<String>,
    pub description: Option<String>,
    pub source_document: Option<String>,
    pub min_loan_amount: Option<f64>,
    pub max_loan_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityRule {
    pub id: String,
    pub loan_program_id: String,
    pub min_loan_amount: f64,
    pub max_loan_amount: f64,
    pub min_fico_score: i64,
    pub max_fico_score: Option<i64>,
    pub occupancy_type: OccupancyType,
    pub loan_purpose: LoanPurposeType,
    pub dscr_value: Option<String>,
    pub max_ltv: f64,
    pub reserves_months: Option<i64>,
    pub notes: Option<String>,
    pub source_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guideline {
    pub id: String,
    pub loan_program_id: String,
    pub category: GuidelineCategory,
    pub content: String,
    pub source_reference: Option<String>,
}
