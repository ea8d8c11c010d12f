//! Report2BQ data products and the Google APIs behind them

use std::collections::BTreeSet;
use std::fmt;

/// APIs every installation needs, regardless of product
pub const BASE_APIS: [&str; 10] = [
    "cloudfunctions.googleapis.com",
    "cloudscheduler.googleapis.com",
    "pubsub.googleapis.com",
    "bigquery.googleapis.com",
    "storage-component.googleapis.com",
    "secretmanager.googleapis.com",
    "cloudbuild.googleapis.com",
    "firestore.googleapis.com",
    "appengine.googleapis.com",
    "iamcredentials.googleapis.com",
];

/// A reporting product Report2BQ can fetch from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Product {
    Adh,
    Cm,
    Dv360,
    Ga360,
    Sa360,
}

pub type ProductSet = BTreeSet<Product>;

impl Product {
    pub const ALL: [Product; 5] = [
        Product::Adh,
        Product::Cm,
        Product::Dv360,
        Product::Ga360,
        Product::Sa360,
    ];

    /// Name used for the function environment flag
    pub fn env_name(&self) -> &'static str {
        match self {
            Product::Adh => "ADH",
            Product::Cm => "CM",
            Product::Dv360 => "DV360",
            Product::Ga360 => "GA360",
            Product::Sa360 => "SA360",
        }
    }

    /// The Google API the product needs
    pub fn api(&self) -> &'static str {
        match self {
            Product::Adh => "adsdatahub.googleapis.com",
            Product::Cm => "dfareporting.googleapis.com",
            Product::Dv360 => "doubleclickbidmanager.googleapis.com",
            Product::Ga360 => "analyticsreporting.googleapis.com",
            Product::Sa360 => "doubleclicksearch.googleapis.com",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_name())
    }
}

/// APIs `--activate-apis` enables: the base set plus every product not
/// switched off
pub fn apis_to_activate(disabled: &ProductSet) -> Vec<&'static str> {
    BASE_APIS
        .iter()
        .copied()
        .chain(
            Product::ALL
                .iter()
                .filter(|p| !disabled.contains(p))
                .map(Product::api),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apis_to_activate_skips_disabled_products() {
        let disabled: ProductSet = [Product::Ga360].into_iter().collect();
        let apis = apis_to_activate(&disabled);

        assert_eq!(apis.len(), BASE_APIS.len() + 4);
        assert!(!apis.contains(&"analyticsreporting.googleapis.com"));
        assert!(apis.contains(&"doubleclicksearch.googleapis.com"));
        assert_eq!(apis[0], "cloudfunctions.googleapis.com");
    }

    #[test]
    fn test_product_api_map() {
        assert_eq!(Product::Adh.api(), "adsdatahub.googleapis.com");
        assert_eq!(Product::Cm.api(), "dfareporting.googleapis.com");
        assert_eq!(Product::Dv360.api(), "doubleclickbidmanager.googleapis.com");
        assert_eq!(Product::Ga360.api(), "analyticsreporting.googleapis.com");
        assert_eq!(Product::Sa360.api(), "doubleclicksearch.googleapis.com");
    }
}
