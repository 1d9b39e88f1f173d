//! Product catalog: the products stock can be tracked for.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use storeledger_core::{DomainError, DomainResult, Entity, KeyValueStore, ProductId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Services are sold but never stocked.
    pub is_service: bool,
}

impl Product {
    pub fn goods(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(),
            sku: sku.into(),
            name: name.into(),
            is_service: false,
        }
    }

    pub fn service(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_service: true,
            ..Self::goods(sku, name)
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Catalog lookups over an injected product store.
#[derive(Clone)]
pub struct ProductCatalog {
    products: Arc<dyn KeyValueStore<ProductId, Product>>,
}

impl ProductCatalog {
    pub fn new(products: Arc<dyn KeyValueStore<ProductId, Product>>) -> Self {
        Self { products }
    }

    pub fn register(&self, product: Product) -> DomainResult<()> {
        if product.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if product.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        self.products.upsert(product.id, product)
    }

    pub fn get(&self, id: ProductId) -> DomainResult<Option<Product>> {
        self.products.get(&id)
    }

    /// The product, or `NotFound`.
    pub fn require(&self, id: ProductId) -> DomainResult<Product> {
        self.products
            .get(&id)?
            .ok_or_else(|| DomainError::not_found("product", id))
    }

    pub fn list(&self) -> DomainResult<Vec<Product>> {
        let mut products = self.products.list()?;
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }
}

impl core::fmt::Debug for ProductCatalog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProductCatalog").finish_non_exhaustive()
    }
}
