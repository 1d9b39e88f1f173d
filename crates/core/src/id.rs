//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a product (catalog entry).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

/// Identifier of a branch (physical store location).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(Uuid);

/// Identifier of a caja (point-of-sale terminal within a branch).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CajaId(Uuid);

/// Identifier of a user (employee / actor identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier of a client (customer).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

/// Identifier of a supplier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(Uuid);

/// Identifier of a sale (including sale records that represent returns).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(Uuid);

/// Identifier of a layaway.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayawayId(Uuid);

/// Identifier of a supplier (purchase) order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierOrderId(Uuid);

/// Identifier of a payment record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

/// Identifier of an inventory log entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntryId(Uuid);

/// Identifier of the transaction that triggered a stock movement.
///
/// Sales, layaways and supplier orders convert into it; manual adjustments and
/// transfers mint a fresh one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(ProductId, "ProductId");
impl_uuid_newtype!(BranchId, "BranchId");
impl_uuid_newtype!(CajaId, "CajaId");
impl_uuid_newtype!(UserId, "UserId");
impl_uuid_newtype!(ClientId, "ClientId");
impl_uuid_newtype!(SupplierId, "SupplierId");
impl_uuid_newtype!(SaleId, "SaleId");
impl_uuid_newtype!(LayawayId, "LayawayId");
impl_uuid_newtype!(SupplierOrderId, "SupplierOrderId");
impl_uuid_newtype!(PaymentId, "PaymentId");
impl_uuid_newtype!(LogEntryId, "LogEntryId");
impl_uuid_newtype!(ReferenceId, "ReferenceId");

macro_rules! impl_reference_from {
    ($($t:ty),+) => {
        $(
            impl From<$t> for ReferenceId {
                fn from(value: $t) -> Self {
                    Self(value.0)
                }
            }
        )+
    };
}

impl_reference_from!(SaleId, LayawayId, SupplierOrderId);
