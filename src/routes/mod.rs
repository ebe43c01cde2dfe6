pub(crate) mod analysis;
pub(crate) mod health;
pub(crate) mod portfolio;
