use std::sync::Arc;

use serde_json::{Value, json};

use cpm_api::{
    ApiContext, ApiRequest, create_cpm_product, create_product_team, delete_cpm_product,
    delete_product_team, read_cpm_product, read_product_team, search_cpm_products,
};
use cpm_infra::InMemoryStore;
use cpm_infra::response::Response;

fn context() -> ApiContext {
    cpm_observability::init();
    ApiContext::new(Arc::new(InMemoryStore::new()))
}

fn team_body(alias: &str) -> Value {
    json!({
        "name": "My Team",
        "ods_code": "F5H1R",
        "keys": [{"key_type": "product_team_id_alias", "key_value": alias}],
    })
}

fn error_code(response: &Response) -> &str {
    response.body["errors"][0]["code"].as_str().unwrap()
}

fn create_team(context: &ApiContext, alias: &str) -> String {
    let response = create_product_team(context, ApiRequest::new().with_json(&team_body(alias)));
    assert_eq!(response.status_code, 201, "{}", response.body);
    response.body["id"].as_str().unwrap().to_owned()
}

fn create_product(context: &ApiContext, team: &str, name: &str) -> String {
    let request = ApiRequest::new()
        .with_path_parameter("product_team_id", team)
        .with_json(&json!({"product_name": name}));
    let response = create_cpm_product(context, request);
    assert_eq!(response.status_code, 201, "{}", response.body);
    response.body["id"].as_str().unwrap().to_owned()
}

fn team_request(team: &str) -> ApiRequest {
    ApiRequest::new().with_path_parameter("product_team_id", team)
}

fn product_request(team: &str, product: &str) -> ApiRequest {
    team_request(team).with_path_parameter("product_id", product)
}

#[test]
fn create_then_read_product_team_by_id_and_alias() {
    let context = context();
    let id = create_team(&context, "my-alias");

    let by_id = read_product_team(&context, team_request(&id));
    assert_eq!(by_id.status_code, 200);
    assert_eq!(by_id.body["name"], "My Team");
    assert_eq!(by_id.body["status"], "active");

    let by_alias = read_product_team(&context, team_request("my-alias"));
    assert_eq!(by_alias.status_code, 200);
    assert_eq!(by_alias.body["id"], id.as_str());
}

#[test]
fn invalid_product_team_bodies_are_rejected() {
    let context = context();

    let missing_field = create_product_team(&context, ApiRequest::new().with_json(&json!({"name": "x"})));
    assert_eq!(missing_field.status_code, 400);
    assert_eq!(error_code(&missing_field), "VALIDATION_ERROR");

    let extra_field = json!({"name": "x", "ods_code": "AAA", "colour": "red"});
    let response = create_product_team(&context, ApiRequest::new().with_json(&extra_field));
    assert_eq!(response.status_code, 400);

    let bad_ods = create_product_team(
        &context,
        ApiRequest::new().with_json(&json!({"name": "x", "ods_code": "lower"})),
    );
    assert_eq!(bad_ods.status_code, 400);

    let not_json = create_product_team(&context, ApiRequest::new().with_body("{"));
    assert_eq!(not_json.status_code, 400);
}

#[test]
fn duplicate_aliases_conflict() {
    let context = context();
    create_team(&context, "shared-alias");

    let response = create_product_team(&context, ApiRequest::new().with_json(&team_body("shared-alias")));
    assert_eq!(response.status_code, 409);
    assert_eq!(error_code(&response), "CONFLICT");

    let repeated_keys = json!({
        "name": "Team",
        "ods_code": "AAA",
        "keys": [
            {"key_type": "product_team_id_alias", "key_value": "a"},
            {"key_type": "product_team_id_alias", "key_value": "a"},
        ],
    });
    let response = create_product_team(&context, ApiRequest::new().with_json(&repeated_keys));
    assert_eq!(response.status_code, 409);
}

#[test]
fn unknown_product_teams_are_not_found() {
    let context = context();
    let response = read_product_team(&context, team_request("no-such-alias"));
    assert_eq!(response.status_code, 404);
    assert_eq!(error_code(&response), "RESOURCE_NOT_FOUND");
    assert_eq!(
        response.body["errors"][0]["message"],
        "not found: Could not find ProductTeam for key ('no-such-alias')"
    );

    let missing = read_product_team(&context, ApiRequest::new());
    assert_eq!(missing.status_code, 400);
}

#[test]
fn product_lifecycle() {
    let context = context();
    let team = create_team(&context, "lifecycle");
    let product = create_product(&context, &team, "My Product");

    let read = read_cpm_product(&context, product_request("lifecycle", &product));
    assert_eq!(read.status_code, 200);
    assert_eq!(read.body["name"], "My Product");
    assert_eq!(read.body["ods_code"], "F5H1R");
    assert_eq!(read.body["product_team_id"], team.as_str());

    let deleted = delete_cpm_product(&context, product_request(&team, &product));
    assert_eq!(deleted.status_code, 200);
    assert_eq!(
        deleted.body,
        json!({"code": "RESOURCE_DELETED", "message": format!("{product} has been deleted.")})
    );

    let gone = read_cpm_product(&context, product_request(&team, &product));
    assert_eq!(gone.status_code, 404);

    let again = delete_cpm_product(&context, product_request(&team, &product));
    assert_eq!(again.status_code, 404);
}

#[test]
fn malformed_product_ids_are_rejected() {
    let context = context();
    let team = create_team(&context, "malformed");

    let response = read_cpm_product(&context, product_request(&team, "not-a-product-id"));
    assert_eq!(response.status_code, 400);

    let response = read_cpm_product(&context, product_request(&team, "P.AAA-AAA"));
    assert_eq!(response.status_code, 404);
}

#[test]
fn products_need_an_existing_team() {
    let context = context();
    let request = team_request("nobody")
        .with_json(&json!({"product_name": "Orphan"}));
    assert_eq!(create_cpm_product(&context, request).status_code, 404);
}

#[test]
fn search_lists_only_active_products() {
    let context = context();
    let team = create_team(&context, "search");
    let kept = create_product(&context, &team, "Kept");
    let dropped = create_product(&context, &team, "Dropped");
    assert_eq!(
        delete_cpm_product(&context, product_request(&team, &dropped)).status_code,
        200
    );

    let response = search_cpm_products(&context, team_request(&team));
    assert_eq!(response.status_code, 200);
    let results = response.body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], kept.as_str());

    let other = create_team(&context, "empty");
    let response = search_cpm_products(&context, team_request(&other));
    assert_eq!(response.body, json!({"results": []}));
}

#[test]
fn teams_with_active_products_cannot_be_deleted() {
    let context = context();
    let team = create_team(&context, "busy");
    let product = create_product(&context, &team, "Busy Product");

    let response = delete_product_team(&context, team_request(&team));
    assert_eq!(response.status_code, 409);
    let message = response.body["errors"][0]["message"].as_str().unwrap();
    assert!(message.starts_with("Product Team cannot be deleted as it still has associated Product Ids"));
    assert!(message.contains(&product));

    assert_eq!(
        delete_cpm_product(&context, product_request(&team, &product)).status_code,
        200
    );
    let response = delete_product_team(&context, team_request(&team));
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["message"], format!("{team} has been deleted."));

    assert_eq!(read_product_team(&context, team_request(&team)).status_code, 404);
    assert_eq!(read_product_team(&context, team_request("busy")).status_code, 404);
}
