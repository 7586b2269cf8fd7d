pub mod entitlement;
pub mod ledger;
pub mod subscription;
