#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use polykern_core::error::ErrorCode;
use polykern_core::{BodyMode, ExchangeContext, Params, Policy, PolicyAction, ProcessingMode};
use polykern_engine::{factory_fn, ChainBuilder, PolicyDefinition, PolicySpec};

use test_policies::registry;

fn builder() -> ChainBuilder {
    ChainBuilder::new(Arc::new(registry()))
}

fn set_header(name: &str, value: &str) -> PolicySpec {
    PolicySpec::new("set-header", "v1")
        .with_param("name", name)
        .with_param("value", value)
}

#[test]
fn places_policies_by_supported_phase_in_order() {
    let chain = builder()
        .build(
            "r1",
            "orders",
            &[
                set_header("x-a", "1"),
                PolicySpec::new("tagger", "v1"),
                PolicySpec::new("set-response-header", "v1")
                    .with_param("name", "x-out")
                    .with_param("value", "1"),
                set_header("x-b", "2"),
            ],
        )
        .unwrap();

    assert_eq!(chain.route_key(), "r1");
    assert_eq!(chain.api_name(), "orders");

    let req: Vec<&str> = chain
        .request_policies()
        .iter()
        .map(|e| e.spec.name.as_str())
        .collect();
    assert_eq!(req, ["set-header", "tagger", "set-header"]);

    let resp: Vec<&str> = chain
        .response_policies()
        .iter()
        .map(|e| e.spec.name.as_str())
        .collect();
    assert_eq!(resp, ["tagger", "set-response-header"]);
    assert!(chain.has_response_phase());
}

#[test]
fn header_only_chain_needs_no_body() {
    let chain = builder()
        .build("r1", "orders", &[set_header("x", "1"), PolicySpec::new("tagger", "v1")])
        .unwrap();
    assert!(!chain.requires_request_body());
    assert!(!chain.requires_response_body());
}

#[test]
fn body_mode_of_any_member_turns_on_buffering() {
    let chain = builder()
        .build(
            "r1",
            "orders",
            &[set_header("x", "1"), PolicySpec::new("body-length", "v1")],
        )
        .unwrap();
    assert!(chain.requires_request_body());
    assert!(!chain.requires_response_body());

    let chain = builder()
        .build("r2", "orders", &[PolicySpec::new("response-body-reader", "v1")])
        .unwrap();
    assert!(!chain.requires_request_body());
    assert!(chain.requires_response_body());
}

struct ModeOnly(ProcessingMode);

#[async_trait::async_trait]
impl Policy for ModeOnly {
    fn mode(&self) -> ProcessingMode {
        self.0
    }

    async fn on_request(
        &self,
        _ctx: &mut ExchangeContext,
        _params: &Params,
    ) -> polykern_core::Result<PolicyAction> {
        Ok(PolicyAction::PassThrough)
    }
}

#[test]
fn body_requirement_is_the_or_over_members() {
    let modes = [
        BodyMode::Skip,
        BodyMode::HeadersOnly,
        BodyMode::BufferFullBody,
        BodyMode::StreamIncrementally,
    ];

    let reg = registry();
    for (i, m) in modes.iter().enumerate() {
        let mode = ProcessingMode::request_headers()
            .with_request_body(*m)
            .with_response_body(*m);
        reg.register(
            PolicyDefinition::new(format!("mode-{i}"), "v1")
                .request_phase()
                .response_phase(),
            factory_fn(move |_m, _p| Ok(Arc::new(ModeOnly(mode)) as Arc<dyn Policy>)),
        )
        .unwrap();
    }
    let builder = ChainBuilder::new(Arc::new(reg));

    // Every pair of members, in both orders.
    for a in 0..modes.len() {
        for b in 0..modes.len() {
            let specs = [
                PolicySpec::new(format!("mode-{a}"), "v1"),
                PolicySpec::new(format!("mode-{b}"), "v1"),
            ];
            let chain = builder.build(&format!("r-{a}-{b}"), "api", &specs).unwrap();
            let want = modes[a].needs_body() || modes[b].needs_body();
            assert_eq!(chain.requires_request_body(), want, "pair {a},{b}");
            assert_eq!(chain.requires_response_body(), want, "pair {a},{b}");
        }
    }
}

#[test]
fn definition_flag_alone_requires_body() {
    let reg = registry();
    reg.register(
        PolicyDefinition::new("declared-body", "v1")
            .request_phase()
            .request_body(),
        factory_fn(|_m, _p| {
            Ok(Arc::new(ModeOnly(ProcessingMode::request_headers())) as Arc<dyn Policy>)
        }),
    )
    .unwrap();

    let chain = ChainBuilder::new(Arc::new(reg))
        .build("r1", "api", &[PolicySpec::new("declared-body", "v1")])
        .unwrap();
    assert!(chain.requires_request_body());
}

#[test]
fn disabled_policies_are_skipped() {
    let chain = builder()
        .build(
            "r1",
            "orders",
            &[
                set_header("x", "1"),
                PolicySpec::new("body-length", "v1").disabled(),
                // Disabled members are not resolved at all.
                PolicySpec::new("not-registered", "v9").disabled(),
            ],
        )
        .unwrap();
    assert_eq!(chain.request_policies().len(), 1);
    assert!(!chain.requires_request_body());
}

#[test]
fn unknown_policy_fails_the_build() {
    let err = builder()
        .build("r1", "orders", &[set_header("x", "1"), PolicySpec::new("ghost", "v1")])
        .expect_err("ghost is not registered");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn missing_name_or_version_fails_the_build() {
    let err = builder()
        .build("r1", "orders", &[PolicySpec::new("set-header", "")])
        .expect_err("empty version");
    assert_eq!(err.code(), ErrorCode::InvalidConfig);
}

#[test]
fn bad_params_fail_the_build() {
    let err = builder()
        .build("r1", "orders", &[PolicySpec::new("set-header", "v1")])
        .expect_err("name/value missing");
    assert_eq!(err.code(), ErrorCode::InvalidParams);
}

#[test]
fn conditions_compile_at_build_time() {
    let chain = builder()
        .build(
            "r1",
            "orders",
            &[set_header("x", "1").with_condition("request.method == \"POST\"")],
        )
        .unwrap();
    let cond = chain.request_policies()[0].condition.as_ref().unwrap();
    assert_eq!(cond.as_str(), "request.method == \"POST\"");

    let err = builder()
        .build(
            "r1",
            "orders",
            &[set_header("x", "1").with_condition("request.method ~= POST")],
        )
        .expect_err("unknown operator");
    assert_eq!(err.code(), ErrorCode::InvalidConfig);
}

#[test]
fn policy_spec_decodes_from_control_plane_json() {
    let spec: PolicySpec = serde_json::from_str(
        r#"{
            "name": "set-header",
            "version": "v1",
            "executionCondition": "request.path startsWith /api",
            "parameters": { "name": "x", "value": "1" }
        }"#,
    )
    .unwrap();
    assert!(spec.enabled);
    assert_eq!(
        spec.execution_condition.as_deref(),
        Some("request.path startsWith /api")
    );
    assert_eq!(spec.parameters.len(), 2);
}
