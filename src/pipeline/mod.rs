pub mod extraction;
pub mod confidence;
pub mod normalization;
pub mod processor;
