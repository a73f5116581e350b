//! Unit tests for Kubernetes resource builders.
//!
//! Run with: `cargo test -p app-operator resources_test`

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    use crate::controller::resources::{
        config_map_name, derive_config_map, derive_deployment, derive_service, env_bindings,
        labels_for, owner_reference, set_controller_reference, SERVICE_PORT,
    };
    use crate::crd::{Application, ApplicationSpec, ProcessSpec};
    use crate::error::Error;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn process(name: &str, image: &str, port: i32, replicas: i32) -> ProcessSpec {
        ProcessSpec {
            name: name.to_string(),
            image: image.to_string(),
            port,
            replicas,
        }
    }

    fn application(name: &str, environment: &[(&str, &str)]) -> Application {
        let mut app = Application::new(
            name,
            ApplicationSpec {
                environment: environment
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                processes: vec![process("web", "nginx:1.17.4", 8080, 5)],
            },
        );
        app.metadata.namespace = Some("testing".to_string());
        app.metadata.uid = Some(format!("uid-{}", name));
        app
    }

    fn expected_labels(name: &str) -> Option<BTreeMap<String, String>> {
        Some(BTreeMap::from([("app".to_string(), name.to_string())]))
    }

    // -----------------------------------------------------------------------
    // Labels and names
    // -----------------------------------------------------------------------

    #[test]
    fn test_labels_are_single_app_entry() {
        let app = application("shop", &[]);
        assert_eq!(Some(labels_for(&app)), expected_labels("shop"));
    }

    #[test]
    fn test_names_derive_from_application_name() {
        let app = application("shop", &[]);
        assert_eq!(config_map_name(&app), "shop-config");
        assert_eq!(derive_config_map(&app).metadata.name.as_deref(), Some("shop-config"));
        assert_eq!(
            derive_deployment(&app).unwrap().metadata.name.as_deref(),
            Some("shop")
        );
        assert_eq!(derive_service(&app).metadata.name.as_deref(), Some("shop"));
    }

    #[test]
    fn test_derived_resources_share_application_namespace() {
        let app = application("shop", &[]);
        assert_eq!(
            derive_config_map(&app).metadata.namespace.as_deref(),
            Some("testing")
        );
        assert_eq!(
            derive_deployment(&app).unwrap().metadata.namespace.as_deref(),
            Some("testing")
        );
        assert_eq!(
            derive_service(&app).metadata.namespace.as_deref(),
            Some("testing")
        );
    }

    #[test]
    fn test_every_label_and_selector_matches() {
        for name in ["a", "shop", "my-long-application-name"] {
            let app = application(name, &[("K", "V")]);
            let cm = derive_config_map(&app);
            let dp = derive_deployment(&app).unwrap();
            let svc = derive_service(&app);
            let dp_spec = dp.spec.unwrap();

            assert_eq!(cm.metadata.labels, expected_labels(name));
            assert_eq!(dp.metadata.labels, expected_labels(name));
            assert_eq!(dp_spec.selector.match_labels, expected_labels(name));
            assert_eq!(
                dp_spec.template.metadata.unwrap().labels,
                expected_labels(name)
            );
            assert_eq!(svc.metadata.labels, expected_labels(name));
            assert_eq!(svc.spec.unwrap().selector, expected_labels(name));
        }
    }

    // -----------------------------------------------------------------------
    // ConfigMap
    // -----------------------------------------------------------------------

    #[test]
    fn test_config_map_copies_environment() {
        let app = application("shop", &[("TEST_MODE", "true"), ("LOG_LEVEL", "debug")]);
        let cm = derive_config_map(&app);
        assert_eq!(cm.data, Some(app.spec.environment.clone()));
    }

    #[test]
    fn test_config_map_with_empty_environment() {
        let app = application("shop", &[]);
        assert_eq!(derive_config_map(&app).data, Some(BTreeMap::new()));
    }

    // -----------------------------------------------------------------------
    // Deployment
    // -----------------------------------------------------------------------

    #[test]
    fn test_deployment_uses_first_process() {
        let mut app = application("shop", &[]);
        app.spec
            .processes
            .push(process("worker", "busybox:1.36", 9000, 2));

        let dp = derive_deployment(&app).unwrap();
        let spec = dp.spec.unwrap();
        assert_eq!(spec.replicas, Some(5));

        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "shop-web");
        assert_eq!(containers[0].image.as_deref(), Some("nginx:1.17.4"));
        let ports = containers[0].ports.clone().unwrap();
        assert_eq!(ports[0].container_port, 8080);
    }

    #[test]
    fn test_env_bindings_reference_config_map() {
        let app = application("shop", &[("A", "1"), ("B", "2")]);
        let env = env_bindings(&app);
        assert_eq!(env.len(), 2);
        for (var, key) in env.iter().zip(["A", "B"]) {
            assert_eq!(var.name, key);
            assert!(var.value.is_none(), "values must not be inlined");
            let selector = var
                .value_from
                .as_ref()
                .and_then(|s| s.config_map_key_ref.as_ref())
                .expect("configMapKeyRef must be set");
            assert_eq!(selector.name.as_deref(), Some("shop-config"));
            assert_eq!(selector.key, key);
        }
    }

    #[test]
    fn test_deployment_env_matches_bindings() {
        let app = application("shop", &[("TEST_MODE", "true")]);
        let dp = derive_deployment(&app).unwrap();
        let container = &dp.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.env, Some(env_bindings(&app)));
    }

    #[test]
    fn test_deployment_without_processes_is_invalid_spec() {
        let mut app = application("shop", &[]);
        app.spec.processes.clear();
        let err = derive_deployment(&app).unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
    }

    // -----------------------------------------------------------------------
    // Service
    // -----------------------------------------------------------------------

    #[test]
    fn test_service_exposes_port_80_externally() {
        let app = application("shop", &[]);
        let spec = derive_service(&app).spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, SERVICE_PORT);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8080)));
    }

    #[test]
    fn test_service_without_processes_has_no_target_port() {
        let mut app = application("shop", &[]);
        app.spec.processes.clear();
        let ports = derive_service(&app).spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].port, 80);
        assert!(ports[0].target_port.is_none());
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    #[test]
    fn test_owner_reference_points_at_application() {
        let app = application("shop", &[]);
        let owner = owner_reference(&app).unwrap();
        assert_eq!(owner.api_version, "app.example.com/v1alpha1");
        assert_eq!(owner.kind, "Application");
        assert_eq!(owner.name, "shop");
        assert_eq!(owner.uid, "uid-shop");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut app = application("shop", &[]);
        app.metadata.uid = Some(String::new());
        assert!(matches!(
            owner_reference(&app),
            Err(Error::OwnershipAssignmentFailed(_))
        ));
    }

    #[test]
    fn test_set_controller_reference_is_idempotent() {
        let app = application("shop", &[]);
        let mut meta = ObjectMeta::default();
        set_controller_reference(&app, &mut meta).unwrap();
        set_controller_reference(&app, &mut meta).unwrap();
        assert_eq!(meta.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn test_set_controller_reference_keeps_non_controller_owners() {
        let app = application("shop", &[]);
        let mut meta = ObjectMeta {
            owner_references: Some(vec![OwnerReference {
                api_version: "v1".to_string(),
                kind: "ConfigMap".to_string(),
                name: "bundle".to_string(),
                uid: "other-uid".to_string(),
                controller: None,
                block_owner_deletion: None,
            }]),
            ..Default::default()
        };
        set_controller_reference(&app, &mut meta).unwrap();
        assert_eq!(meta.owner_references.unwrap().len(), 2);
    }

    #[test]
    fn test_set_controller_reference_rejects_foreign_controller() {
        let app = application("shop", &[]);
        let other = application("other", &[]);
        let mut meta = ObjectMeta {
            name: Some("shop".to_string()),
            ..Default::default()
        };
        set_controller_reference(&other, &mut meta).unwrap();

        let err = set_controller_reference(&app, &mut meta).unwrap_err();
        assert!(matches!(err, Error::OwnershipAssignmentFailed(_)));
        assert!(!err.is_retriable());
    }
}
