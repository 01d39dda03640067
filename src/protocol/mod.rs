pub mod canonical;
pub mod cli_event;
pub mod openai_chat;
