/*!
    XML envelope codec for the Windows enrollment services.

    Documents are read into a plain [`Element`] tree, checked against
    the expected message shape with a [`Decoder`], and written back out
    with attributes and children in exactly the order they were built.
*/

mod decode;
mod element;
mod error;
mod namespace;
mod read;
mod write;

pub use decode::{Cursor, Decoder, Issue, ValidationIssues};
pub use element::{Element, Node};
pub use error::{XmlError, XmlResult};
pub use namespace::Namespace;
pub use read::parse;
pub use write::{to_document_string, to_string};
