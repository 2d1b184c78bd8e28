//! Message parsing: MBOX splitting, headers, MIME trees, payload and
//! header decoding, certified-mail unwrapping, and content extraction.

pub mod address;
pub mod encoded_word;
pub mod extract;
pub mod header;
pub mod mbox;
pub mod mime;
pub mod payload;
pub mod pec;
