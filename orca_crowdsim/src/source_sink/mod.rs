pub mod source_sink;
