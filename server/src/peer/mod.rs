mod server;

pub use server::ServerPeer;
pub(crate) use server::{default_handle_connection, default_handle_error, HandleConnectionFn, HandleErrorFn, HandleRequestFn};
