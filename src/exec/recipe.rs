// src/exec/recipe.rs

//! Figure out how a data step is executed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ExecSection;

use super::script::{NotebookTransform, ScriptTransform};
use super::transform::{Transform, TransformRegistry};

/// Entry point of a step implemented as a directory.
pub const DIR_ENTRY_STEM: &str = "__main__";

/// The resolved way of executing a data step.
#[derive(Clone)]
pub enum Recipe {
    /// Transform compiled into this binary.
    Registered(Arc<dyn Transform>),
    /// `<name>.<ext>` or `<name>/__main__.<ext>` run by an interpreter.
    Script(ScriptTransform),
    /// `<name>.ipynb`, executed under the notebook lock.
    Notebook(NotebookTransform),
}

impl Recipe {
    pub fn transform(&self) -> &dyn Transform {
        match self {
            Recipe::Registered(t) => t.as_ref(),
            Recipe::Script(t) => t,
            Recipe::Notebook(t) => t,
        }
    }

    pub fn is_notebook(&self) -> bool {
        matches!(self, Recipe::Notebook(_))
    }

    /// Recipes that only exist in this process (registered transforms) or
    /// must share its notebook lock never go to a child.
    pub fn runs_in_parent(&self) -> bool {
        matches!(self, Recipe::Registered(_) | Recipe::Notebook(_))
    }

    pub fn describe(&self) -> String {
        self.transform().describe()
    }
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Recipe").field(&self.describe()).finish()
    }
}

/// `<search_path>.<ext>`, keeping any dots already in the file name.
pub fn with_suffix(search_path: &Path, ext: &str) -> PathBuf {
    let mut s = search_path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Resolve the recipe for the step at `path`, whose files live at
/// `search_path`.
///
/// Registered transforms win, then interpreter scripts (single file before
/// directory entry point), then notebooks.
pub fn resolve_recipe(
    path: &str,
    search_path: &Path,
    registry: &TransformRegistry,
    exec: &ExecSection,
) -> Option<Recipe> {
    if let Some(t) = registry.get(path) {
        return Some(Recipe::Registered(t));
    }

    for (ext, interpreter) in exec.interpreters.iter() {
        let script = with_suffix(search_path, ext);
        if script.is_file() {
            return Some(Recipe::Script(ScriptTransform::new(interpreter, script)));
        }
        let entry = search_path.join(format!("{DIR_ENTRY_STEM}.{ext}"));
        if entry.is_file() {
            return Some(Recipe::Script(ScriptTransform::new(interpreter, entry)));
        }
    }

    let notebook = with_suffix(search_path, "ipynb");
    if notebook.is_file() {
        return Some(Recipe::Notebook(NotebookTransform::new(
            exec.notebook_command.clone(),
            notebook,
        )));
    }

    None
}
