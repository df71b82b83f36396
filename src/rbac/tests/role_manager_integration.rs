//! Integration tests for the role managers
//!
//! Organizational hierarchies, multi-tenant domains, conditional links,
//! group fallback and concurrent access.

use cretoai_rbac::role_manager::{not_expired, wildcard_match, RoleLinks};
use cretoai_rbac::{
    ConditionalRoleManager, CycleDetector, DefaultRoleManager, DomainRoleManager,
    GroupRoleManager, RbacError, RoleManager,
};
use std::sync::Arc;
use std::thread;

/// ceo <- vp_engineering <- director_backend <- manager_api <- engineer_alice
fn build_org_chart(rm: &dyn RoleManager, domains: &[&str]) {
    let links = [
        ("vp_engineering", "ceo"),
        ("vp_sales", "ceo"),
        ("director_backend", "vp_engineering"),
        ("director_frontend", "vp_engineering"),
        ("manager_api", "director_backend"),
        ("engineer_alice", "manager_api"),
        ("engineer_bob", "director_frontend"),
    ];
    for (child, parent) in links {
        rm.add_link(child, parent, domains).unwrap();
    }
}

#[test]
fn test_organizational_hierarchy() {
    let rm = DefaultRoleManager::new(10);
    build_org_chart(&rm, &[]);

    assert!(rm.has_link("engineer_alice", "ceo", &[]).unwrap());
    assert!(rm.has_link("engineer_bob", "vp_engineering", &[]).unwrap());
    assert!(!rm.has_link("engineer_bob", "director_backend", &[]).unwrap());
    assert!(!rm.has_link("ceo", "engineer_alice", &[]).unwrap());

    assert_eq!(
        rm.implicit_roles("engineer_alice", &[]).unwrap(),
        vec!["manager_api", "director_backend", "vp_engineering", "ceo"]
    );

    let mut users = rm.get_users("vp_engineering", &[]).unwrap();
    users.sort();
    assert_eq!(users, vec!["director_backend", "director_frontend"]);
}

#[test]
fn test_hierarchy_limit_cuts_long_chains() {
    let rm = DefaultRoleManager::new(2);
    build_org_chart(&rm, &[]);

    assert!(rm.has_link("engineer_alice", "director_backend", &[]).unwrap());
    assert!(!rm.has_link("engineer_alice", "vp_engineering", &[]).unwrap());

    rm.set_max_hierarchy_level(4);
    assert!(rm.has_link("engineer_alice", "ceo", &[]).unwrap());
}

#[test]
fn test_delete_link_and_not_found() {
    let rm = DefaultRoleManager::new(10);
    rm.add_link("alice", "admin", &[]).unwrap();
    rm.delete_link("alice", "admin", &[]).unwrap();
    assert!(!rm.has_link("alice", "admin", &[]).unwrap());

    let err = rm.delete_link("carol", "admin", &[]).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        rm.get_roles("carol", &[]),
        Err(RbacError::RoleNotFound(_))
    ));
}

#[test]
fn test_multi_tenant_isolation() {
    let rm = DomainRoleManager::new(10);
    build_org_chart(&rm, &["acme"]);
    rm.add_link("engineer_alice", "contractor", &["globex"]).unwrap();

    assert!(rm.has_link("engineer_alice", "ceo", &["acme"]).unwrap());
    assert!(!rm.has_link("engineer_alice", "ceo", &["globex"]).unwrap());
    assert!(rm.has_link("engineer_alice", "contractor", &["globex"]).unwrap());

    let mut domains = rm.domains_for("engineer_alice");
    domains.sort();
    assert_eq!(domains, vec!["acme", "globex"]);
}

#[test]
fn test_wildcard_domain_propagation() {
    let rm = DomainRoleManager::new(10);
    rm.add_domain_matching_fn(wildcard_match);

    rm.add_link("alice", "auditor", &["*"]).unwrap();
    rm.add_link("bob", "writer", &["d1"]).unwrap();

    // d3 is created after the pattern link was added
    rm.add_link("carol", "writer", &["d3"]).unwrap();
    assert!(rm.has_link("alice", "auditor", &["d3"]).unwrap());
    assert!(rm.has_link("alice", "auditor", &["d1"]).unwrap());
    assert!(!rm.has_link("bob", "writer", &["d3"]).unwrap());
}

#[test]
fn test_pattern_role_names() {
    let rm = DomainRoleManager::new(10);
    rm.add_matching_fn(wildcard_match);
    rm.add_link("book:*", "book_reader", &["library"]).unwrap();

    assert!(rm.has_link("book:1", "book_reader", &["library"]).unwrap());
    assert!(!rm.has_link("pen:1", "book_reader", &["library"]).unwrap());
}

#[test]
fn test_conditional_expiry() {
    let rm = ConditionalRoleManager::new(10);
    rm.add_link("alice", "oncall", &[]).unwrap();
    rm.add_link_condition_func("alice", "oncall", not_expired);

    rm.set_link_condition_func_params("alice", "oncall", &["100", "200"]);
    assert!(rm.has_link("alice", "oncall", &[]).unwrap());

    rm.set_link_condition_func_params("alice", "oncall", &["300", "200"]);
    assert!(!rm.has_link("alice", "oncall", &[]).unwrap());

    // malformed parameters are absorbed as "not eligible"
    rm.set_link_condition_func_params("alice", "oncall", &["soon"]);
    assert!(!rm.has_link("alice", "oncall", &[]).unwrap());
}

#[test]
fn test_conditional_domain_guard_falls_back_to_default_guard() {
    let rm = ConditionalRoleManager::new(10);
    rm.add_link("alice", "admin", &["d1"]).unwrap();
    rm.add_link("alice", "admin", &["d2"]).unwrap();

    rm.add_link_condition_func("alice", "admin", not_expired);
    rm.set_link_condition_func_params("alice", "admin", &["300", "200"]);
    rm.add_domain_link_condition_func("alice", "admin", "d2", not_expired);
    rm.set_domain_link_condition_func_params("alice", "admin", "d2", &["100", "200"]);

    // d1 has no guard of its own and uses the expired default guard
    assert!(!rm.has_link("alice", "admin", &["d1"]).unwrap());
    assert!(rm.has_link("alice", "admin", &["d2"]).unwrap());
}

#[test]
fn test_group_fallback() {
    let rm = GroupRoleManager::new(10);
    rm.add_link("alice", "sre", &[]).unwrap();
    rm.add_link("sre", "deployer", &["prod"]).unwrap();
    rm.add_link("deployer", "viewer", &["prod"]).unwrap();

    assert!(rm.has_link("alice", "viewer", &["prod"]).unwrap());
    assert!(!rm.has_link("alice", "viewer", &["dev"]).unwrap());
    assert!(!rm.has_link("mallory", "viewer", &["prod"]).unwrap());
}

#[test]
fn test_cycle_detection_on_each_manager() {
    let managers: Vec<Box<dyn RoleManager>> = vec![
        Box::new(DefaultRoleManager::new(10)),
        Box::new(DomainRoleManager::new(10)),
        Box::new(ConditionalRoleManager::new(10)),
        Box::new(GroupRoleManager::new(10)),
    ];
    let detector = CycleDetector::new();

    for rm in managers {
        rm.add_link("a", "b", &[]).unwrap();
        rm.add_link("b", "c", &[]).unwrap();
        assert_eq!(detector.check(rm.as_ref()), None);

        rm.add_link("c", "a", &[]).unwrap();
        assert_eq!(
            detector.check(rm.as_ref()).unwrap(),
            "Cycle detected: a -> b -> c -> a"
        );
        // cyclic graphs still answer queries
        assert!(rm.has_link("c", "b", &[]).unwrap());
    }
}

#[test]
fn test_role_links_serialize() {
    let rm = DomainRoleManager::new(10);
    rm.add_link("alice", "admin", &["acme"]).unwrap();

    let links: Vec<RoleLinks> = rm
        .role_links()
        .into_iter()
        .filter(|l| !l.parents.is_empty())
        .collect();
    let json = serde_json::to_value(&links).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{ "domain": "acme", "name": "alice", "parents": ["admin"] }])
    );
}

#[test]
fn test_print_roles_logs_through_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let rm = DefaultRoleManager::new(10);
    rm.print_roles();
    build_org_chart(&rm, &[]);
    rm.print_roles();
}

#[test]
fn test_concurrent_reads_and_writes() {
    let rm = Arc::new(DomainRoleManager::new(10));
    rm.add_domain_matching_fn(wildcard_match);
    rm.add_link("admin", "member", &["*"]).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let rm = Arc::clone(&rm);
            thread::spawn(move || {
                for i in 0..100 {
                    let domain = format!("tenant{}", t);
                    rm.add_link(&format!("user{}", i), "admin", &[domain.as_str()])
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|t| {
            let rm = Arc::clone(&rm);
            thread::spawn(move || {
                let domain = format!("tenant{}", t);
                for i in 0..100 {
                    // either not yet linked or linked through admin
                    let _ = rm
                        .has_link(&format!("user{}", i), "member", &[domain.as_str()])
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    for t in 0..4 {
        let domain = format!("tenant{}", t);
        assert!(rm.has_link("user99", "member", &[domain.as_str()]).unwrap());
    }
}
