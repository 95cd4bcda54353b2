//! Built-in binding isotherms.
//!
//! New isotherms implement [`BindingModel`](crate::model::BindingModel) and get
//! a [`ModelKind`](crate::model::ModelKind) variant.

mod one_set_of_sites;

pub use one_set_of_sites::OneSetOfSites;
