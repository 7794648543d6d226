use cpm_core::ProductTeamId;
use cpm_infra::response::{CREATED, ConflictError, OK, Response};
use cpm_infra::{Step, StepData};
use cpm_products::{ProductTeam, ProductTeamKey, ProductTeamKeyType};

use crate::app::dto::{CreateProductTeamRequest, DeletedResponse};
use crate::app::errors::{ensure_active, on_missing};
use crate::app::{PRODUCT_TEAM_ID, handle, request};
use crate::context::{ApiContext, ApiRequest};

const ENTITY: &str = "ProductTeam";

/// Read an active team by id, or by alias when the value is not an id.
pub(crate) fn read_active_product_team(
    context: &ApiContext,
    id_or_alias: &str,
) -> anyhow::Result<ProductTeam> {
    let team = match id_or_alias.parse::<ProductTeamId>() {
        Ok(id) => context.product_teams.read(&id),
        Err(_) => {
            let alias = ProductTeamKey::new(ProductTeamKeyType::ProductTeamIdAlias, id_or_alias)?;
            context.product_teams.read_by_key(&alias)
        }
    }
    .map_err(on_missing(ENTITY, id_or_alias))?;
    ensure_active(team.status(), ENTITY, id_or_alias)?;
    Ok(team)
}

pub(crate) fn parse_product_team_id(data: &StepData, _: &mut ApiContext) -> anyhow::Result<String> {
    Ok(request(data)?.path_parameter(PRODUCT_TEAM_ID)?.to_owned())
}

pub(crate) fn read_product_team_step(data: &StepData, context: &mut ApiContext) -> anyhow::Result<ProductTeam> {
    let id = data.require::<String>("parse_path_params")?;
    read_active_product_team(context, id)
}

pub fn create_product_team(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new(
            "parse_event_body",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<CreateProductTeamRequest> {
                Ok(self::request(data)?.json_body()?)
            },
        ),
        Step::new(
            "create_product_team",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<ProductTeam> {
                let body = data.require::<CreateProductTeamRequest>("parse_event_body")?;
                Ok(ProductTeam::create(
                    ProductTeamId::new(),
                    body.name.clone(),
                    body.ods_code.clone(),
                    body.keys.clone(),
                )?)
            },
        ),
        Step::new(
            "save_product_team",
            |data: &StepData, context: &mut ApiContext| -> anyhow::Result<ProductTeam> {
                let mut team = data.require::<ProductTeam>("create_product_team")?.clone();
                context.product_teams.write(&mut team)?;
                Ok(team)
            },
        ),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let team = data.require::<ProductTeam>("save_product_team")?;
                Ok(Response::success(CREATED, team.record()))
            },
        ),
    ];
    handle("create_product_team", steps, context, request)
}

pub fn read_product_team(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new("parse_path_params", parse_product_team_id),
        Step::new("read_product_team", read_product_team_step),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let team = data.require::<ProductTeam>("read_product_team")?;
                Ok(Response::success(OK, team.record()))
            },
        ),
    ];
    handle("read_product_team", steps, context, request)
}

/// Soft-delete a team that no longer owns any active product.
pub fn delete_product_team(context: &ApiContext, request: ApiRequest) -> Response {
    let steps = vec![
        Step::new("parse_path_params", parse_product_team_id),
        Step::new("read_product_team", read_product_team_step),
        Step::new(
            "read_products",
            |data: &StepData, context: &mut ApiContext| -> anyhow::Result<()> {
                let team = data.require::<ProductTeam>("read_product_team")?;
                let mut product_ids = Vec::new();
                for product in context.products.search(&team.record().id) {
                    let product = product?;
                    if product.status().is_active() {
                        product_ids.push(product.record().id.to_string());
                    }
                }
                if !product_ids.is_empty() {
                    return Err(ConflictError(format!(
                        "Product Team cannot be deleted as it still has associated Product Ids {product_ids:?}"
                    ))
                    .into());
                }
                Ok(())
            },
        ),
        Step::new(
            "delete_product_team",
            |data: &StepData, context: &mut ApiContext| -> anyhow::Result<ProductTeam> {
                let mut team = data.require::<ProductTeam>("read_product_team")?.clone();
                team.delete()?;
                context.product_teams.write(&mut team)?;
                Ok(team)
            },
        ),
        Step::new(
            "set_http_status",
            |data: &StepData, _: &mut ApiContext| -> anyhow::Result<Response> {
                let team = data.require::<ProductTeam>("delete_product_team")?;
                Ok(Response::success(OK, &DeletedResponse::new(team.record().id)))
            },
        ),
    ];
    handle("delete_product_team", steps, context, request)
}
