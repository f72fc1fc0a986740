//! Core building blocks: storage operators, the audit journal, the book
//! layout model, search, archives, and the book catalog.

pub mod archive;
pub mod audit;
pub mod catalog;
pub mod layout;
pub mod operator;
pub mod search;
