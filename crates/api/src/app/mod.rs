//! Handler wiring.
//!
//! Layout:
//! - `product_team.rs` / `product.rs`: one step chain per handler
//! - `dto.rs`: request bodies and response shapes
//! - `errors.rs`: request-level failures (missing or deleted resources)

use cpm_infra::response::Response;
use cpm_infra::{LogStep, Step, StepChain, StepData};

use crate::context::{ApiContext, ApiRequest};

pub mod dto;
pub mod errors;
pub mod product;
pub mod product_team;

pub use product::{create_cpm_product, delete_cpm_product, read_cpm_product, search_cpm_products};
pub use product_team::{create_product_team, delete_product_team, read_product_team};

pub const PRODUCT_TEAM_ID: &str = "product_team_id";
pub const PRODUCT_ID: &str = "product_id";

/// Run a handler's steps against `request` and render the outcome.
///
/// The last step must produce the [`Response`]; any error is rendered instead.
pub(crate) fn handle(
    handler: &'static str,
    steps: Vec<Step<ApiContext>>,
    context: &ApiContext,
    request: ApiRequest,
) -> Response {
    let span = tracing::info_span!("handler", handler);
    let _entered = span.enter();

    let mut context = context.clone();
    let outcome = StepChain::new(steps)
        .map_err(anyhow::Error::from)
        .and_then(|chain| {
            chain
                .with_decorator(LogStep)
                .run(request, &mut context)
                .into_result::<Response>()
        });
    let response = match outcome {
        Ok(response) => response,
        Err(err) => Response::error(&err),
    };
    tracing::info!(status_code = response.status_code, "handled request");
    response
}

pub(crate) fn request(data: &StepData) -> anyhow::Result<&ApiRequest> {
    data.init::<ApiRequest>()
        .ok_or_else(|| anyhow::anyhow!("handler started without a request"))
}
