use std::fmt;

/// Naming of a type object within the managed runtime.
///
/// # Examples
///
/// ```
/// use proxybind_core::QualifiedName;
///
/// let top = QualifiedName::new("Vec3", None, Some("geometry"));
/// assert_eq!(top.full_name(), "geometry.Vec3");
///
/// let nested = QualifiedName::new("Iter", Some("Mesh"), Some("geometry"));
/// assert_eq!(nested.qualname, "Mesh.Iter");
/// assert_eq!(nested.to_string(), "geometry.Mesh.Iter");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    /// Simple name (`__name__`).
    pub name: String,
    /// Dotted path from the module level (`__qualname__`).
    pub qualname: String,
    /// Name of the owning module (`__module__`), if known.
    pub module: Option<String>,
}

impl QualifiedName {
    /// Build a name from its parts. `scope_qualname` is the qualname of an
    /// enclosing type, if the type is nested in one.
    pub fn new(name: impl Into<String>, scope_qualname: Option<&str>, module: Option<&str>) -> Self {
        let name = name.into();
        let qualname = match scope_qualname {
            Some(scope) if !scope.is_empty() => format!("{scope}.{name}"),
            _ => name.clone(),
        };
        Self {
            name,
            qualname,
            module: module.map(str::to_string),
        }
    }

    /// A name with no enclosing scope.
    pub fn global(name: impl Into<String>) -> Self {
        Self::new(name, None, None)
    }

    /// Module-qualified dotted name.
    pub fn full_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{module}.{}", self.qualname),
            None => self.qualname.clone(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}.{}", self.qualname),
            None => f.write_str(&self.qualname),
        }
    }
}
