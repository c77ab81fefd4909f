pub mod codec;
pub mod compression;
pub mod transport;

pub use codec::{MessageDecoder, MessageEncoder};
pub use compression::{Compress, Compressor, Decompress};
pub use transport::{Acceptor, Connection, Reactor};
