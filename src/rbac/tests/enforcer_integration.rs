//! End-to-end enforcement with configuration loaded from TOML

use cretoai_rbac::role_manager::{wildcard_match, RoleManager};
use cretoai_rbac::{DomainRoleManager, Enforcer, GroupRoleManager, RbacConfig, RbacError};
use std::io::Write;
use std::sync::Arc;

const MULTI_TENANT_CONFIG: &str = r#"
[role_manager]
max_hierarchy_level = 5
domain_cache_capacity = 32

[model]
request = ["sub", "dom", "obj", "act"]
policy = ["sub", "dom", "obj", "act", "eft"]
effect = "some(where (p.eft == allow)) && !some(where (p.eft == deny))"
"#;

fn multi_tenant_enforcer(config: &RbacConfig) -> Enforcer {
    Enforcer::from_config(config, |ctx| {
        Ok(ctx.has_link("g", ctx.r("sub"), ctx.p("sub"), Some(ctx.r("dom")))?
            && wildcard_match(ctx.r("dom"), ctx.p("dom"))
            && wildcard_match(ctx.r("obj"), ctx.p("obj"))
            && ctx.r("act") == ctx.p("act"))
    })
    .unwrap()
}

#[test]
fn test_multi_tenant_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MULTI_TENANT_CONFIG.as_bytes()).unwrap();
    let config = RbacConfig::from_file(file.path()).unwrap();

    let enforcer = multi_tenant_enforcer(&config);
    let rm = DomainRoleManager::from_config(&config.role_manager);
    rm.add_domain_matching_fn(wildcard_match);
    enforcer.set_role_manager("g", Arc::new(rm)).unwrap();

    enforcer.add_grouping_policy(&["alice", "admin", "*"]).unwrap();
    enforcer.add_grouping_policy(&["bob", "editor", "acme"]).unwrap();
    enforcer.add_grouping_policy(&["editor", "viewer", "acme"]).unwrap();

    enforcer.add_policy(&["admin", "*", "doc:*", "write", "allow"]).unwrap();
    enforcer.add_policy(&["viewer", "acme", "doc:*", "read", "allow"]).unwrap();
    enforcer.add_policy(&["bob", "acme", "doc:secret", "read", "deny"]).unwrap();

    assert!(enforcer.enforce(&["alice", "globex", "doc:1", "write"]).unwrap());
    assert!(enforcer.enforce(&["bob", "acme", "doc:1", "read"]).unwrap());
    assert!(!enforcer.enforce(&["bob", "globex", "doc:1", "read"]).unwrap());

    let (allowed, explain) = enforcer
        .enforce_ex(&["bob", "acme", "doc:secret", "read"])
        .unwrap();
    assert!(!allowed);
    assert_eq!(explain.unwrap(), vec!["bob", "acme", "doc:secret", "read", "deny"]);
}

#[test]
fn test_group_role_manager_behind_enforcer() {
    let config = RbacConfig::from_toml_str(MULTI_TENANT_CONFIG).unwrap();
    let enforcer = multi_tenant_enforcer(&config);
    enforcer
        .set_role_manager("g", Arc::new(GroupRoleManager::from_config(&config.role_manager)))
        .unwrap();

    // group membership is domain-less, the group's role is per tenant
    enforcer.add_grouping_policy(&["carol", "sre"]).unwrap();
    enforcer.add_grouping_policy(&["sre", "operator", "acme"]).unwrap();
    enforcer.add_policy(&["operator", "acme", "doc:*", "read", "allow"]).unwrap();

    assert!(enforcer.enforce(&["carol", "acme", "doc:runbook", "read"]).unwrap());
    assert!(!enforcer.enforce(&["carol", "globex", "doc:runbook", "read"]).unwrap());
}

#[test]
fn test_rebuild_after_direct_mutation() {
    let config = RbacConfig::from_toml_str(MULTI_TENANT_CONFIG).unwrap();
    let enforcer = multi_tenant_enforcer(&config);
    enforcer.add_grouping_policy(&["dave", "viewer", "acme"]).unwrap();
    enforcer.add_policy(&["viewer", "acme", "doc:*", "read", "allow"]).unwrap();

    let rm = enforcer.role_manager("g").unwrap();
    rm.delete_link("dave", "viewer", &["acme"]).unwrap();
    assert!(!enforcer.enforce(&["dave", "acme", "doc:1", "read"]).unwrap());

    enforcer.build_role_links().unwrap();
    assert!(enforcer.enforce(&["dave", "acme", "doc:1", "read"]).unwrap());
}

#[test]
fn test_default_role_manager_uses_config() {
    let config = RbacConfig::from_toml_str(MULTI_TENANT_CONFIG).unwrap();
    let enforcer = multi_tenant_enforcer(&config);
    assert_eq!(enforcer.role_manager_config().domain_cache_capacity, 32);
    assert_eq!(enforcer.role_manager_config().max_hierarchy_level, 5);

    enforcer.add_grouping_policy(&["frank", "viewer", "acme"]).unwrap();
    let links = enforcer.role_manager("g").unwrap().role_links();
    assert!(links.iter().all(|l| l.domain.as_deref() == Some("acme")));
    let frank = links.iter().find(|l| l.name == "frank").unwrap();
    assert_eq!(frank.qualified_name(), "acme::frank");
    assert_eq!(frank.parents, vec!["viewer"]);
}

#[test]
fn test_invalid_config_rejected() {
    let err = RbacConfig::from_toml_str(
        r#"
        [model]
        effect = "max(p.eft)"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, RbacError::Config(_)));

    let missing = RbacConfig::from_file("/nonexistent/rbac.toml").unwrap_err();
    assert!(matches!(missing, RbacError::Io(_)));
}

#[test]
fn test_enforcer_is_shareable_across_threads() {
    let config = RbacConfig::from_toml_str(MULTI_TENANT_CONFIG).unwrap();
    let enforcer = Arc::new(multi_tenant_enforcer(&config));
    enforcer.add_grouping_policy(&["erin", "viewer", "acme"]).unwrap();
    enforcer.add_policy(&["viewer", "acme", "doc:*", "read", "allow"]).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let enforcer = Arc::clone(&enforcer);
            std::thread::spawn(move || {
                let doc = format!("doc:{}", i);
                enforcer.enforce(&["erin", "acme", doc.as_str(), "read"]).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
