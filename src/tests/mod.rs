pub(crate) mod support;

mod pipeline;
