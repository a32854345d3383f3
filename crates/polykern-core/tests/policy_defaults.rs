#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use async_trait::async_trait;

use polykern_core::error::{ErrorCode, PolykernError};
use polykern_core::{
    ExchangeContext, Params, Policy, PolicyAction, ProcessingMode, RequestData, Result,
};

struct Noop;

#[async_trait]
impl Policy for Noop {
    fn mode(&self) -> ProcessingMode {
        ProcessingMode::request_headers()
    }

    async fn on_request(&self, ctx: &mut ExchangeContext, _params: &Params) -> Result<PolicyAction> {
        ctx.metadata.insert("seen".into(), true.into());
        Ok(PolicyAction::PassThrough)
    }
}

#[tokio::test]
async fn response_phase_and_validation_default_to_no_ops() {
    let policy = Noop;
    let mut ctx = ExchangeContext::new("r1", RequestData::new("GET", "/"));
    let params = Params::new();

    assert!(policy.on_request(&mut ctx, &params).await.unwrap().is_pass_through());
    assert!(policy.on_response(&mut ctx, &params).await.unwrap().is_pass_through());
    assert!(policy.validate(&params).is_ok());
    assert_eq!(ctx.metadata.get("seen").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn error_codes_are_stable() {
    let cases = [
        (PolykernError::NotFound("x".into()), "NOT_FOUND"),
        (PolykernError::InvalidParams("x".into()), "INVALID_PARAMS"),
        (PolykernError::Decode("x".into()), "DECODE"),
        (PolykernError::Cancelled, "CANCELLED"),
        (
            PolykernError::Policy {
                name: "p".into(),
                reason: "r".into(),
            },
            "POLICY",
        ),
    ];
    for (err, code) in cases {
        assert_eq!(err.code().as_str(), code);
    }

    assert!(PolykernError::Transport("x".into()).is_transport());
    assert!(PolykernError::Timeout("x".into()).is_transport());
    assert!(!PolykernError::Decode("x".into()).is_transport());
    assert_eq!(PolykernError::RouteNotFound("r".into()).code(), ErrorCode::RouteNotFound);
}
