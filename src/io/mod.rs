mod format;
mod input;
mod output;

pub use format::DocumentFormat;
pub use input::{declaration_schema, load_form_config, parse_document_str};
pub use output::{
    FieldRow, OutputDestination, OutputOptions, SessionSnapshot, emit, emit_text,
};
