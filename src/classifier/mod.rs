mod client;
mod inference;

pub use client::{ClassifierClient, ToxicityClassifier};
pub use inference::ClassifierError;
