//! Raw TME terms as they arrive from the authority-file service.
//!
//! A page is an XML document of the form
//!
//! ```text
//! <taxonomy>
//!   <term>
//!     <name>Banksville, New York</name>
//!     <id>Nstein_GL_US_NY_Municipality_942968</id>
//!     <enabled>true</enabled>
//!     <variations>
//!       <variation>
//!         <name>Banksville</name><weight>1</weight><case>s</case><accent>s</accent>
//!         <languages><language>en</language></languages>
//!       </variation>
//!     </variations>
//!   </term>
//! </taxonomy>
//! ```
//!
//! Every field is optional at this layer; deciding what is mandatory belongs to the
//! transformer, so one bad term never fails the whole page.

use serde::{Deserialize, Serialize};

use crate::error::{FetcherError, Result};

/// One upstream term. Transient: dropped once transformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source-assigned identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Canonical label.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<String>,
    #[serde(default)]
    pub variations: Option<Variations>,
}

impl RawRecord {
    /// Builds a record with the two fields the transformer needs.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Labeled variations, empty when the term carries none.
    pub fn variations(&self) -> &[Variation] {
        self.variations
            .as_ref()
            .map(|v| v.items.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variations {
    #[serde(rename = "variation", default)]
    pub items: Vec<Variation>,
}

/// Alternative spelling of a term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub case: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub languages: Option<Languages>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Languages {
    #[serde(rename = "language", default)]
    pub items: Vec<String>,
}

/// Collects every `<term>`, even when other elements sit between them. Relies on the
/// `overlapped-lists` feature of quick-xml.
#[derive(Debug, Default, Deserialize)]
struct TermsPage {
    #[serde(rename = "term", default)]
    terms: Vec<RawRecord>,
}

/// Decodes one upstream page.
///
/// An empty body is an empty page. A body that is not a well-formed taxonomy document
/// is a [`FetcherError::MalformedPayload`].
pub fn parse_page(body: &str) -> Result<Vec<RawRecord>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let page: TermsPage = quick_xml::de::from_str(body)
        .map_err(|e| FetcherError::MalformedPayload(e.to_string()))?;
    Ok(page.terms)
}
