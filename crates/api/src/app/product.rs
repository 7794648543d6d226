use cpm_core::ProductId;
use cpm_infra::response::{CREATED, OK, Response};
use cpm_infra::{Step, StepData};
use cpm_products::{CpmProduct, CpmProductRecord, ProductTeam};

use crate::app::dto::{CreateCpmProductRequest, DeletedResponse, SearchResponse};
use crate::app::errors::{ensure_active, on_missing};
use crate::app::product_team::{parse_product_team_id, read_product_team_step};
use crate::app::{PRODUCT_ID, handle, request};
use crate::context::{ApiContext, ApiRequest};

const ENTITY: &str = "CpmProduct";

fn parse_product_id(data: &StepData, _: &mut ApiContext) -> anyhow::Result<ProductId> {
    Ok(request(data)?.path_parameter(PRODUCT_ID)?.parse()?)
}

fn read_product(data: &StepData, context: &mut ApiContext) -> anyhow::Result<CpmProduct> {
    let team = data.require::<ProductTeam>("read_product_team")?;
    let product_id = data.require::<ProductId>("parse_product_id")?;
    let product = context
        .products
        .read(&team.record().id, product_id)
        .map_err(on_missing(ENTITY, product_id))?;
    ensure_active(product.status(), ENTITY, product_id)?;
    Ok(product)
}

pub fn create_cpm_product(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new("parse_path_params", parse_product_team_id),
        Step::new(
            "parse_event_body",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<CreateCpmProductRequest> {
                Ok(self::request(data)?.json_body()?)
            },
        ),
        Step::new("read_product_team", read_product_team_step),
        Step::new(
            "create_cpm_product",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<CpmProduct> {
                let team = data.require::<ProductTeam>("read_product_team")?;
                let body = data.require::<CreateCpmProductRequest>("parse_event_body")?;
                Ok(team.create_cpm_product(ProductId::new(), body.product_name.clone())?)
            },
        ),
        Step::new(
            "save_cpm_product",
            |data: &StepData, context: &mut ApiContext| -> anyhow::Result<CpmProduct> {
                let mut product = data.require::<CpmProduct>("create_cpm_product")?.clone();
                context.products.write(&mut product)?;
                Ok(product)
            },
        ),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let product = data.require::<CpmProduct>("save_cpm_product")?;
                Ok(Response::success(CREATED, product.record()))
            },
        ),
    ];
    handle("create_cpm_product", steps, context, request)
}

pub fn read_cpm_product(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new("parse_path_params", parse_product_team_id),
        Step::new("parse_product_id", parse_product_id),
        Step::new("read_product_team", read_product_team_step),
        Step::new("read_product", read_product),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let product = data.require::<CpmProduct>("read_product")?;
                Ok(Response::success(OK, product.record()))
            },
        ),
    ];
    handle("read_cpm_product", steps, context, request)
}

pub fn delete_cpm_product(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new("parse_path_params", parse_product_team_id),
        Step::new("parse_product_id", parse_product_id),
        Step::new("read_product_team", read_product_team_step),
        Step::new("read_product", read_product),
        Step::new(
            "delete_product",
            |data: &StepData, context: &mut ApiContext| -> anyhow::Result<CpmProduct> {
                let mut product = data.require::<CpmProduct>("read_product")?.clone();
                product.delete()?;
                context.products.write(&mut product)?;
                Ok(product)
            },
        ),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let product = data.require::<CpmProduct>("delete_product")?;
                Ok(Response::success(OK, &DeletedResponse::new(&product.record().id)))
            },
        ),
    ];
    handle("delete_cpm_product", steps, context, request)
}

/// Active products of a team; deleted ones are left out.
pub fn search_cpm_products(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new("parse_path_params", parse_product_team_id),
        Step::new("read_product_team", read_product_team_step),
        Step::new(
            "query_products",
            |data: &StepData, context: &mut ApiContext| -> anyhow::Result<Vec<CpmProductRecord>> {
                let team = data.require::<ProductTeam>("read_product_team")?;
                let mut results = Vec::new();
                for product in context.products.search(&team.record().id) {
                    let product = product?;
                    if product.status().is_active() {
                        results.push(product.into_record());
                    }
                }
                Ok(results)
            },
        ),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let results = data.require::<Vec<CpmProductRecord>>("query_products")?.clone();
                Ok(Response::success(OK, &SearchResponse { results }))
            },
        ),
    ];
    handle("search_cpm_products", steps, context, request)
}
