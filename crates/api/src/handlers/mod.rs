pub mod extractions;
