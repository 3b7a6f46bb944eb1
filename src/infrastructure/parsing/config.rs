//! Parsing configuration for HTML extraction
//!
//! Centralized CSS selectors and label texts of the registry detail page.

use serde::{Deserialize, Serialize};

use crate::infrastructure::config::studbook;

/// Selectors and markers of the horse detail page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HorseDetailSelectors {
    /// Cell holding the horse name
    pub name: String,

    /// Pedigree links in slot order
    pub pedigree_item: String,

    /// Link to the taproot ancestor inside the `Taproot:` cell
    pub taproot_link: String,

    /// Emphasised value inside the `Family:` cell
    pub family_value: String,

    /// Heading that carries the server error marker
    pub error_heading: String,

    pub server_error_marker: String,
}

impl Default for HorseDetailSelectors {
    fn default() -> Self {
        Self {
            name: "td.HeaderBlockNasuy".to_string(),
            pedigree_item: "a.PedigreeItem".to_string(),
            taproot_link: "a.subscribelink".to_string(),
            family_value: "b".to_string(),
            error_heading: "h1".to_string(),
            server_error_marker: studbook::SERVER_ERROR_MARKER.to_string(),
        }
    }
}

/// Lowercase labels scanned for in table cells
pub mod labels {
    pub const LIFE_NUMBER: &str = "life number:";
    pub const DATE_OF_BIRTH: &str = "date of birth:";
    pub const MICROCHIP_NUMBER: &str = "microchip number:";
    pub const DNA_TYPED: &str = "dna typed:";
    pub const AUST_ID: &str = "aust.id.:";
    pub const BRED_BY: &str = "bred by ";
    pub const DECEASED: &str = "deceased ";

    /// Case-sensitive markers
    pub const FAMILY: &str = "Family:";
    pub const TAPROOT: &str = "Taproot:";
    pub const FOAL_REF: &str = "Foal ref: ";
}
