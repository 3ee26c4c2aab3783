//! TaskBridge wire types
//!
//! JSON bodies exchanged on the `/execute-task` endpoint and with the remote
//! node registry. Field names follow the external contracts exactly, which is
//! why the registry types mix camelCase and snake_case.

use serde::{Deserialize, Serialize};

pub mod task {
    use super::*;

    /// Body of `POST /execute-task`
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ExecuteTaskRequest {
        pub prompt: String,
    }

    /// Outcome of a task, discriminated by the `status` field
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "status")]
    pub enum TaskResponse {
        #[serde(rename = "task complete")]
        Complete { response: String },

        #[serde(rename = "error")]
        Error { message: String },
    }

    impl TaskResponse {
        pub fn complete(response: impl Into<String>) -> Self {
            TaskResponse::Complete {
                response: response.into(),
            }
        }

        pub fn error(message: impl Into<String>) -> Self {
            TaskResponse::Error {
                message: message.into(),
            }
        }

        pub fn is_complete(&self) -> bool {
            matches!(self, TaskResponse::Complete { .. })
        }
    }

    /// One turn of a chat-style prompt
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String,
        pub content: String,
    }

    impl ChatMessage {
        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".to_string(),
                content: content.into(),
            }
        }
    }
}

pub mod registry {
    use super::*;

    /// Response of `GET <registry>/check-registration?nodeId=<id>`
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CheckRegistrationResponse {
        #[serde(default)]
        pub is_registered: Option<bool>,
    }

    impl CheckRegistrationResponse {
        /// Missing or null means not registered
        pub fn registered(&self) -> bool {
            self.is_registered.unwrap_or(false)
        }
    }

    /// Body of `POST <registry>/register`
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RegisterRequest {
        pub node_id: String,
        pub wallet_address: String,
    }

    /// Body of `POST <heartbeat-url>`
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct HeartbeatRequest {
        pub node_id: String,
        pub wallet_address: String,
        pub ip_address: Option<String>,
        pub port: Option<u16>,
    }
}

pub use registry::{CheckRegistrationResponse, HeartbeatRequest, RegisterRequest};
pub use task::{ChatMessage, ExecuteTaskRequest, TaskResponse};
