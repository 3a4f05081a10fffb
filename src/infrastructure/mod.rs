// Infrastructure layer - External dependencies and adapters
pub mod address_file;
pub mod chunked_json;
pub mod config;
pub mod frame_codec;
pub mod http_response;
pub mod ws_connector;
