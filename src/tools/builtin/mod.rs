//! Built-in tools that come with the gateway.

mod echo;
mod navigate;
mod notes;

pub use echo::EchoTool;
pub use navigate::OpenPageTool;
pub use notes::{CreateNoteTool, DeleteNoteTool, ListNotesTool, NoteBook};

use std::sync::Arc;

use crate::error::CatalogError;
use crate::tools::{ToolCatalog, ToolRegistry};

/// Catalog of the bundled tools. `delete_note` is the only destructive one.
pub fn default_catalog() -> Result<ToolCatalog, CatalogError> {
    let book = NoteBook::new();
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool))?;
    registry.register(Arc::new(OpenPageTool))?;
    registry.register(Arc::new(CreateNoteTool::new(Arc::clone(&book))))?;
    registry.register(Arc::new(DeleteNoteTool::new(Arc::clone(&book))))?;
    registry.register(Arc::new(ListNotesTool::new(book)))?;
    ToolCatalog::new(registry, ["delete_note"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ToolClass;

    #[test]
    fn test_default_catalog_classes() {
        let catalog = default_catalog().unwrap();
        assert_eq!(catalog.registry().len(), 5);
        assert_eq!(catalog.classify("list_notes"), ToolClass::ReadOnly);
        assert_eq!(catalog.classify("create_note"), ToolClass::Mutation);
        assert_eq!(catalog.classify("delete_note"), ToolClass::Destructive);
        assert_eq!(catalog.classify("open_page"), ToolClass::ReadOnly);
    }
}
