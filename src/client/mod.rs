//! Client side of the upload flow: select a file, get a URL from the
//! issuer, PUT the bytes, then record the document in the catalogue.

pub mod draft;
pub mod transport;
pub mod uploader;

pub use draft::{DocumentDraft, DraftError};
pub use transport::{HttpTransport, ProgressFn, TransportError, UploadTransport};
pub use uploader::{
    ClientConfig, SelectedFile, Submission, UploadError, UploadState, Uploader,
};
