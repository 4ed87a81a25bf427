mod chat_client;
mod config;
mod pipeline;
