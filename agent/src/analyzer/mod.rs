pub mod gateway;

pub use gateway::{ChatCompletion, ChatMessage, ChatReply, ChatRequest, GatewayClient};
