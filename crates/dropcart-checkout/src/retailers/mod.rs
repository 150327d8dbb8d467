//! Storefront variants of [`RetailerAdapter`].

pub mod bestbuy;
pub mod thesource;
pub mod walmart;

use dropcart_core::{Product, Storefront};

pub use bestbuy::BestBuy;
pub use thesource::TheSource;
pub use walmart::Walmart;

use crate::adapter::{AdapterContext, RetailerAdapter};

/// Picks the variant for `ctx.storefront`.
#[must_use]
pub fn build_adapter(ctx: AdapterContext, products: Vec<Product>) -> Box<dyn RetailerAdapter> {
    match ctx.storefront {
        Storefront::BestBuy => Box::new(BestBuy::new(ctx, products)),
        Storefront::Walmart => Box::new(Walmart::new(ctx, products)),
        Storefront::TheSource => Box::new(TheSource::new(ctx, products)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{adapter_context, RecordingNotifier, ScriptedPage};

    #[test]
    fn builds_matching_variant() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        for storefront in Storefront::ALL {
            let ctx = adapter_context(storefront, &ScriptedPage::new(), &notifier, dir.path(), true);
            let adapter = build_adapter(ctx, Vec::new());
            assert_eq!(adapter.storefront(), storefront);
            assert!(adapter.products().is_empty());
        }
    }
}
