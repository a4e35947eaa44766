use serde::Serialize;

/// Table contents with every cell already coerced to text.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultsTable {
    Rows {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Single "No results found" row, no header.
    Empty,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenderedResults {
    /// Raw SQL exactly as the backend produced it.
    pub sql: String,
    pub table: ResultsTable,
}

/// Results panel of a session: hidden until the first successful answer,
/// then replaced wholesale by each later one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultsPanel {
    #[default]
    Hidden,
    Shown(RenderedResults),
}

impl ResultsPanel {
    pub fn show(&mut self, rendered: RenderedResults) {
        *self = ResultsPanel::Shown(rendered);
    }

    pub fn rendered(&self) -> Option<&RenderedResults> {
        match self {
            ResultsPanel::Hidden => None,
            ResultsPanel::Shown(r) => Some(r),
        }
    }
}
