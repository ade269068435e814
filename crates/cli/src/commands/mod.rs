pub(crate) mod aggregate;
pub(crate) mod matrix;
pub(crate) mod survey;
