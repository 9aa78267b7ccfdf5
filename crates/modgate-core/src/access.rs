//! Access checks between modules
//!
//! Access from one module to a package of another needs two things at once:
//! the accessor must read the target, and the target must export the
//! package to the accessor. Neither is enough on its own.

use crate::module::{ExportVisibility, Module};
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

/// Why an access was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The accessor does not read the target module
    NotReadable,
    /// The target does not export the package at all
    PackageNotExported,
    /// The target exports the package, but not to the accessor
    PackageNotExportedToModule,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenyReason::NotReadable => "not-readable",
            DenyReason::PackageNotExported => "package-not-exported",
            DenyReason::PackageNotExportedToModule => "package-not-exported-to-module",
        };
        f.write_str(text)
    }
}

/// Result of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessDecision {
    /// Access may proceed
    Allow,
    /// Access must fail
    Deny(DenyReason),
}

impl AccessDecision {
    /// Whether access is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Turn a deny into an [`AccessError`] naming the classes involved
    ///
    /// `from_class` and `to_class` are fully qualified class names used only
    /// to render the diagnostic.
    pub fn into_result(
        self,
        request: &AccessRequest<'_>,
        from_class: &str,
        to_class: &str,
    ) -> Result<(), AccessError> {
        match self {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(reason) => Err(AccessError {
                reason,
                message: render_denial(request, reason, from_class, to_class),
            }),
        }
    }
}

/// One access attempt, built per check and never stored
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Module of the class making the access
    pub accessor: &'a Module,
    /// Module of the class being accessed
    pub target: &'a Module,
    /// Package of the class being accessed
    pub package: &'a str,
}

impl<'a> AccessRequest<'a> {
    /// Build a request
    pub fn new(accessor: &'a Module, target: &'a Module, package: &'a str) -> Self {
        Self {
            accessor,
            target,
            package,
        }
    }

    /// Run the check
    pub fn check(&self) -> AccessDecision {
        check_access(self.accessor, self.target, self.package)
    }
}

/// Denied access, carrying a linkage-style diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AccessError {
    /// Failing condition
    pub reason: DenyReason,
    /// Rendered diagnostic
    pub message: String,
}

/// Decide whether `accessor` may use package `package` of `target`
pub fn check_access(accessor: &Module, target: &Module, package: &str) -> AccessDecision {
    if accessor.identity() == target.identity() {
        trace!(module = %accessor.identity(), package, "same-module access");
        return AccessDecision::Allow;
    }

    let readable = accessor.can_read(target);
    let visibility = target.export_visibility(package, accessor.identity());

    let decision = if !readable {
        AccessDecision::Deny(DenyReason::NotReadable)
    } else {
        match visibility {
            ExportVisibility::Visible => AccessDecision::Allow,
            ExportVisibility::NotExported => AccessDecision::Deny(DenyReason::PackageNotExported),
            ExportVisibility::NotExportedToModule => {
                AccessDecision::Deny(DenyReason::PackageNotExportedToModule)
            }
        }
    };

    match decision {
        AccessDecision::Allow => {
            trace!(from = %accessor.identity(), to = %target.identity(), package, "access allowed");
        }
        AccessDecision::Deny(reason) => {
            debug!(from = %accessor.identity(), to = %target.identity(), package, %reason, "access denied");
        }
    }
    decision
}

fn render_denial(
    request: &AccessRequest<'_>,
    reason: DenyReason,
    from_class: &str,
    to_class: &str,
) -> String {
    let from = request.accessor.to_string();
    let to = request.target.to_string();
    let because = match reason {
        DenyReason::NotReadable => format!("{} does not read {}", from, to),
        DenyReason::PackageNotExported => {
            format!("{} does not export {}", to, request.package)
        }
        DenyReason::PackageNotExportedToModule => {
            format!("{} does not export {} to {}", to, request.package, from)
        }
    };
    format!(
        "class {} (in {}) cannot access class {} (in {}) because {}",
        from_class, from, to_class, to, because
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModuleDescriptor;
    use crate::layer::LayerId;
    use crate::loader::Loader;
    use crate::module::{ModuleIdentity, RuntimeExport};
    use rustc_hash::FxHashSet;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn module(name: &str, reads: &[&Module], exports: Vec<(&str, RuntimeExport)>) -> Module {
        let mut builder = ModuleDescriptor::builder(name).contains(format!("{}.hidden", name));
        for (package, _) in &exports {
            builder = builder.contains(*package);
        }
        let reads: FxHashSet<ModuleIdentity> = reads.iter().map(|m| m.identity().clone()).collect();
        let exports: BTreeMap<String, RuntimeExport> = exports
            .into_iter()
            .map(|(package, export)| (package.to_string(), export))
            .collect();
        Module::named(
            Arc::new(builder.build().unwrap()),
            Loader::Platform,
            LayerId::next(),
            false,
            reads,
            exports,
        )
    }

    #[test]
    fn test_same_module_always_allowed() {
        let m1 = module("m1", &[], vec![]);
        assert_eq!(check_access(&m1, &m1, "m1.hidden"), AccessDecision::Allow);
    }

    #[test]
    fn test_not_readable_wins_over_export() {
        let m2 = module("m2", &[], vec![("p2", RuntimeExport::Unqualified)]);
        let m1 = module("m1", &[], vec![]);
        assert_eq!(
            check_access(&m1, &m2, "p2"),
            AccessDecision::Deny(DenyReason::NotReadable)
        );
    }

    #[test]
    fn test_readable_and_exported() {
        let m2 = module("m2", &[], vec![("p2", RuntimeExport::Unqualified)]);
        let m1 = module("m1", &[&m2], vec![]);
        assert!(check_access(&m1, &m2, "p2").is_allowed());
        assert_eq!(
            check_access(&m1, &m2, "m2.hidden"),
            AccessDecision::Deny(DenyReason::PackageNotExported)
        );
    }

    #[test]
    fn test_qualified_export_membership() {
        let m3 = module("m3", &[], vec![]);
        let m1 = module("m1", &[], vec![]);
        let mut targets = FxHashSet::default();
        targets.insert(m1.identity().clone());
        let m2 = module("m2", &[], vec![("p2", RuntimeExport::Qualified(targets))]);
        m1.add_reads(Some(&m2));
        m3.add_reads(Some(&m2));

        assert!(check_access(&m1, &m2, "p2").is_allowed());
        assert_eq!(
            check_access(&m3, &m2, "p2"),
            AccessDecision::Deny(DenyReason::PackageNotExportedToModule)
        );
    }

    #[test]
    fn test_denial_message() {
        let m2 = module("m2", &[], vec![("p2", RuntimeExport::Unqualified)]);
        let m1 = module("m1", &[], vec![]);
        let request = AccessRequest::new(&m1, &m2, "p2");

        let err = request.check().into_result(&request, "p1.c1", "p2.c2").unwrap_err();
        assert_eq!(err.reason, DenyReason::NotReadable);
        assert_eq!(
            err.to_string(),
            "class p1.c1 (in module m1) cannot access class p2.c2 (in module m2) \
             because module m1 does not read module m2"
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DenyReason::NotReadable.to_string(), "not-readable");
        assert_eq!(
            DenyReason::PackageNotExportedToModule.to_string(),
            "package-not-exported-to-module"
        );
    }
}
