//! Module descriptors
//!
//! A [`ModuleDescriptor`] is the immutable declaration of a module: its name,
//! the modules it requires, the packages it contains and which of those
//! packages it exports (to everyone, or only to a named set of modules).
//! Descriptors are built once with [`ModuleDescriptorBuilder`] and then shared
//! across any number of resolutions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Errors raised while building a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Module name (or a required module name) is not a legal qualified name
    #[error("Invalid module name: '{0}'")]
    InvalidModuleName(String),

    /// Package name is not a legal qualified name
    #[error("Invalid package name '{package}' in module '{module}'")]
    InvalidPackageName {
        /// Declaring module
        module: String,
        /// Offending package name
        package: String,
    },

    /// Module lists itself in its own requires
    #[error("Module '{0}' cannot require itself")]
    SelfRequires(String),

    /// The same package is exported twice with different qualification
    #[error("Package '{package}' exported more than once by module '{module}' with conflicting targets")]
    ConflictingExport {
        /// Exporting module
        module: String,
        /// Package exported twice
        package: String,
    },

    /// A qualified export has no targets or targets the exporting module
    #[error("Invalid export target for package '{package}' in module '{module}': {reason}")]
    InvalidExportTarget {
        /// Exporting module
        module: String,
        /// Exported package
        package: String,
        /// What is wrong with the targets
        reason: String,
    },
}

/// How a package is exported
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExportSpec {
    /// Visible to every module that reads the exporter
    Unqualified,
    /// Visible only to the named modules
    Qualified(BTreeSet<String>),
}

impl ExportSpec {
    /// Whether a module named `module` may see this export
    pub fn allows(&self, module: &str) -> bool {
        match self {
            ExportSpec::Unqualified => true,
            ExportSpec::Qualified(targets) => targets.contains(module),
        }
    }

    /// Whether this export is qualified
    pub fn is_qualified(&self) -> bool {
        matches!(self, ExportSpec::Qualified(_))
    }
}

/// Immutable module declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    name: String,
    requires: BTreeSet<String>,
    exports: BTreeMap<String, ExportSpec>,
    packages: BTreeSet<String>,
}

impl ModuleDescriptor {
    /// Start building a descriptor for a module called `name`
    pub fn builder(name: impl Into<String>) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder::new(name)
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the modules this module requires
    pub fn requires(&self) -> &BTreeSet<String> {
        &self.requires
    }

    /// Exported packages and their qualification
    pub fn exports(&self) -> &BTreeMap<String, ExportSpec> {
        &self.exports
    }

    /// Every package the module contains, exported or not
    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    /// Whether the module contains `package`
    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    /// Whether `package` is exported unqualifiedly
    pub fn is_exported(&self, package: &str) -> bool {
        matches!(self.exports.get(package), Some(ExportSpec::Unqualified))
    }

    /// Whether `package` is exported to the module named `module`
    pub fn is_exported_to(&self, package: &str, module: &str) -> bool {
        self.exports
            .get(package)
            .map(|spec| spec.allows(module))
            .unwrap_or(false)
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;
        for required in &self.requires {
            writeln!(f, "    requires {};", required)?;
        }
        for (package, spec) in &self.exports {
            match spec {
                ExportSpec::Unqualified => writeln!(f, "    exports {};", package)?,
                ExportSpec::Qualified(targets) => {
                    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
                    writeln!(f, "    exports {} to {};", package, targets.join(", "))?
                }
            }
        }
        write!(f, "}}")
    }
}

/// Accumulates the parts of a [`ModuleDescriptor`]
///
/// Validation is deferred to [`build`](Self::build) so that every builder
/// call stays infallible and chainable.
#[derive(Debug, Clone)]
pub struct ModuleDescriptorBuilder {
    name: String,
    requires: Vec<String>,
    exports: Vec<(String, ExportSpec)>,
    packages: Vec<String>,
}

impl ModuleDescriptorBuilder {
    /// Create a builder for a module called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            exports: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// Add a dependence on module `name`
    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }

    /// Export `package` to every module
    pub fn exports(mut self, package: impl Into<String>) -> Self {
        self.exports.push((package.into(), ExportSpec::Unqualified));
        self
    }

    /// Export `package` only to the listed modules
    pub fn exports_to<I, S>(mut self, package: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.exports
            .push((package.into(), ExportSpec::Qualified(targets)));
        self
    }

    /// Declare a package the module contains without exporting it
    pub fn contains(mut self, package: impl Into<String>) -> Self {
        self.packages.push(package.into());
        self
    }

    /// Validate and produce the descriptor
    pub fn build(self) -> Result<ModuleDescriptor, DescriptorError> {
        if !is_valid_qualified_name(&self.name) {
            return Err(DescriptorError::InvalidModuleName(self.name));
        }

        let mut requires = BTreeSet::new();
        for required in self.requires {
            if !is_valid_qualified_name(&required) {
                return Err(DescriptorError::InvalidModuleName(required));
            }
            if required == self.name {
                return Err(DescriptorError::SelfRequires(self.name));
            }
            requires.insert(required);
        }

        let mut packages = BTreeSet::new();
        for package in self.packages {
            check_package(&self.name, &package)?;
            packages.insert(package);
        }

        let mut exports: BTreeMap<String, ExportSpec> = BTreeMap::new();
        for (package, spec) in self.exports {
            check_package(&self.name, &package)?;
            if let ExportSpec::Qualified(targets) = &spec {
                if targets.is_empty() {
                    return Err(DescriptorError::InvalidExportTarget {
                        module: self.name,
                        package,
                        reason: "no target modules".to_string(),
                    });
                }
                if let Some(bad) = targets.iter().find(|t| !is_valid_qualified_name(t)) {
                    return Err(DescriptorError::InvalidModuleName(bad.clone()));
                }
                if targets.contains(&self.name) {
                    return Err(DescriptorError::InvalidExportTarget {
                        module: self.name,
                        package,
                        reason: "module exports to itself".to_string(),
                    });
                }
            }
            match exports.get(&package) {
                Some(existing) if *existing != spec => {
                    return Err(DescriptorError::ConflictingExport {
                        module: self.name,
                        package,
                    });
                }
                Some(_) => {}
                None => {
                    packages.insert(package.clone());
                    exports.insert(package, spec);
                }
            }
        }

        Ok(ModuleDescriptor {
            name: self.name,
            requires,
            exports,
            packages,
        })
    }
}

fn check_package(module: &str, package: &str) -> Result<(), DescriptorError> {
    if is_valid_qualified_name(package) {
        Ok(())
    } else {
        Err(DescriptorError::InvalidPackageName {
            module: module.to_string(),
            package: package.to_string(),
        })
    }
}

const RESERVED: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final",
    "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "native", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "true", "try", "void", "volatile", "while",
];

/// Check a dot-separated name such as `java.base` or `p1.internal`
pub(crate) fn is_valid_qualified_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_valid_identifier)
}

fn is_valid_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return false;
    }
    segment != "_" && !RESERVED.contains(&segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_descriptor() {
        let descriptor = ModuleDescriptor::builder("m1")
            .requires("java.base")
            .requires("m2")
            .exports("p1")
            .build()
            .unwrap();

        assert_eq!(descriptor.name(), "m1");
        assert_eq!(descriptor.requires().len(), 2);
        assert!(descriptor.is_exported("p1"));
        assert!(descriptor.contains("p1"));
    }

    #[test]
    fn test_qualified_export() {
        let descriptor = ModuleDescriptor::builder("m2")
            .exports_to("p2", ["m1"])
            .build()
            .unwrap();

        assert!(!descriptor.is_exported("p2"));
        assert!(descriptor.is_exported_to("p2", "m1"));
        assert!(!descriptor.is_exported_to("p2", "m3"));
    }

    #[test]
    fn test_self_requires_rejected() {
        let err = ModuleDescriptor::builder("m1")
            .requires("m1")
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::SelfRequires("m1".to_string()));
    }

    #[test]
    fn test_conflicting_export_rejected() {
        let err = ModuleDescriptor::builder("m1")
            .exports("p1")
            .exports_to("p1", ["m2"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::ConflictingExport { .. }));
    }

    #[test]
    fn test_identical_export_accepted() {
        let descriptor = ModuleDescriptor::builder("m1")
            .exports_to("p1", ["m2"])
            .exports_to("p1", ["m2"])
            .build()
            .unwrap();
        assert_eq!(descriptor.exports().len(), 1);
    }

    #[test]
    fn test_malformed_package_rejected() {
        for bad in ["", "p1..p2", "1p", "p-1", "p.class", ".p"] {
            let err = ModuleDescriptor::builder("m1").exports(bad).build().unwrap_err();
            assert!(
                matches!(err, DescriptorError::InvalidPackageName { .. }),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_malformed_module_name_rejected() {
        let err = ModuleDescriptor::builder("m 1").build().unwrap_err();
        assert_eq!(err, DescriptorError::InvalidModuleName("m 1".to_string()));
    }

    #[test]
    fn test_export_to_self_rejected() {
        let err = ModuleDescriptor::builder("m1")
            .exports_to("p1", ["m1"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidExportTarget { .. }));
    }

    #[test]
    fn test_contained_package_not_exported() {
        let descriptor = ModuleDescriptor::builder("m1")
            .contains("p1.internal")
            .build()
            .unwrap();
        assert!(descriptor.contains("p1.internal"));
        assert!(!descriptor.is_exported_to("p1.internal", "m2"));
    }

    #[test]
    fn test_display() {
        let descriptor = ModuleDescriptor::builder("m2")
            .requires("java.base")
            .exports_to("p2", ["m1"])
            .build()
            .unwrap();
        let text = descriptor.to_string();
        assert!(text.contains("requires java.base;"));
        assert!(text.contains("exports p2 to m1;"));
    }
}
