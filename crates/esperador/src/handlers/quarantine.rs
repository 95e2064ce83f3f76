//! Quarantine command handler

use crate::QuarantineArgs;
use esperar::TestRegistry;

/// Print `Suite:method` for every quarantined test, returning the lines
pub fn execute_quarantine(registry: &TestRegistry, args: &QuarantineArgs) -> Vec<String> {
    let lines = registry.quarantined(&args.suites);
    for line in &lines {
        println!("{line}");
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use esperar::TestSuite;

    fn registry() -> TestRegistry {
        TestRegistry::new()
            .with_suite(
                TestSuite::new("shop::CartTest")
                    .test("adds_item", |_| Ok(()))
                    .quarantined_test("checkout", |_| Ok(())),
            )
            .with_suite(TestSuite::new("LoginTest").quarantined_test("sso", |_| Ok(())))
    }

    #[test]
    fn test_lists_all_quarantined() {
        let lines = execute_quarantine(&registry(), &QuarantineArgs::default());
        assert_eq!(lines, vec!["shop::CartTest:checkout", "LoginTest:sso"]);
    }

    #[test]
    fn test_restricted_to_suites() {
        let args = QuarantineArgs {
            suites: vec!["LoginTest".to_string()],
        };
        assert_eq!(execute_quarantine(&registry(), &args), vec!["LoginTest:sso"]);
    }

    #[test]
    fn test_empty_registry() {
        assert!(execute_quarantine(&TestRegistry::new(), &QuarantineArgs::default()).is_empty());
    }
}
