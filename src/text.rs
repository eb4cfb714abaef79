pub mod chunking;
pub mod tokenizer;
