//! Hand-written OpenAPI 3 description of the HTTP surface.

use serde_json::{json, Value};

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorDetail"}}}
    })
}

fn json_response(description: &str, schema: Value) -> Value {
    json!({
        "description": description,
        "content": {"application/json": {"schema": schema}}
    })
}

pub fn document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Mortgage AI Chatbot",
            "description": "A chatbot for querying mortgage guidelines.",
            "version": env!("CARGO_PKG_VERSION")
        },
        "paths": {
            "/": {
                "get": {
                    "tags": ["Health"],
                    "summary": "Health check",
                    "responses": {"200": json_response("Service is up", json!({"type": "object"}))}
                }
            },
            "/api/v1/chat": {
                "post": {
                    "tags": ["Chat"],
                    "summary": "Send a message to the mortgage assistant",
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ChatRequest"}}}
                    },
                    "responses": {
                        "200": json_response("Assistant reply", json!({"$ref": "#/components/schemas/ChatResponse"})),
                        "400": error_response("Empty message"),
                        "500": error_response("Chat processing failed")
                    }
                }
            },
            "/api/v1/conversations": {
                "get": {
                    "tags": ["Chat"],
                    "summary": "List conversations, most recent first",
                    "responses": {
                        "200": json_response("Conversations", json!({
                            "type": "array",
                            "items": {"$ref": "#/components/schemas/ConversationInfo"}
                        }))
                    }
                }
            },
            "/api/v1/conversations/{conversation_id}": {
                "get": {
                    "tags": ["Chat"],
                    "summary": "Conversation details with all messages",
                    "parameters": [{
                        "name": "conversation_id",
                        "in": "path",
                        "required": true,
                        "schema": {"type": "string"}
                    }],
                    "responses": {
                        "200": json_response("Conversation", json!({"$ref": "#/components/schemas/ConversationDetail"})),
                        "404": error_response("Conversation not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "ChatRequest": {
                    "type": "object",
                    "required": ["message"],
                    "properties": {
                        "message": {"type": "string"},
                        "conversation_id": {"type": "string", "nullable": true}
                    }
                },
                "ChatResponse": {
                    "type": "object",
                    "required": ["response", "conversation_id"],
                    "properties": {
                        "response": {"type": "string"},
                        "conversation_id": {"type": "string"}
                    }
                },
                "ConversationInfo": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "summary": {"type": "string", "nullable": true},
                        "createdAt": {"type": "string", "format": "date-time"}
                    }
                },
                "MessageInfo": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "role": {"type": "string", "enum": ["USER", "AI"]},
                        "content": {"type": "string"},
                        "createdAt": {"type": "string", "format": "date-time"}
                    }
                },
                "ConversationDetail": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "summary": {"type": "string", "nullable": true},
                        "createdAt": {"type": "string", "format": "date-time"},
                        "messages": {"type": "array", "items": {"$ref": "#/components/schemas/MessageInfo"}}
                    }
                },
                "ErrorDetail": {
                    "type": "object",
                    "properties": {"detail": {"type": "string"}}
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = document();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/",
            "/api/v1/chat",
            "/api/v1/conversations",
            "/api/v1/conversations/{conversation_id}",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
        assert_eq!(doc["openapi"], "3.0.3");
    }

    #[test]
    fn schema_references_resolve() {
        let doc = document();
        let schemas = doc["components"]["schemas"].as_object().unwrap();
        let text = doc.to_string();
        for (start, _) in text.match_indices("#/components/schemas/") {
            let rest = &text[start + "#/components/schemas/".len()..];
            let name: String = rest.chars().take_while(|c| c.is_alphanumeric()).collect();
            assert!(schemas.contains_key(&name), "dangling ref {}", name);
        }
    }
}
