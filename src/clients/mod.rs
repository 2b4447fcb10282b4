pub mod gateway;
pub mod traits;

pub use gateway::HttpChatGateway;
pub use traits::{
    ChatGateway, ChatMessage, ChatRequest, ChatResponse, ContentPart, GatewayError,
    MessageContent,
};
