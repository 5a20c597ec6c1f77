//! The `transport` module is responsible for handling network communication
//! with clients via WebSockets.
//!
//! It defines the JSON protocol used between clients and the server, and
//! implements the WebSocket server itself: accepting connections, parsing
//! requests and answering each one with the broker's result.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{handle_request, serve, start_websocket_server};
