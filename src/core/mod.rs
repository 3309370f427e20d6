// Core modules: native bindings, typesetting, the document model and its storage.
pub mod document;
pub mod error;
pub mod family;
pub mod length;
pub mod native;
pub mod store;
pub mod stream;
pub mod text;
