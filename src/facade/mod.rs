mod cloner;
mod store;

pub use store::ActiveStore;
