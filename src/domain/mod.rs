// Domain layer - Plain models shared by every other layer
pub mod command;
pub mod console;
pub mod link;
pub mod telemetry;
