

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::collaborators::{CollaboratorError, MockDelivery, RecipeBook};


#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct GetRecipeParams {
    #[schemars(description = "Dish to look up (e.g., 'chicken curry')")]
    pub dish_name: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct CompareIngredientsParams {
    #[schemars(description = "Ingredients the recipe needs")]
    pub required: Vec<String>,
    #[schemars(description = "Ingredients already in the pantry")]
    pub available: Vec<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct PlaceOrderParams {
    #[schemars(description = "Ingredient names to order")]
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct GetOrderStatusParams {
    #[schemars(description = "Order ID returned by place_order")]
    pub order_id: String,
}


/// Serves the built-in recipe book and delivery service as MCP tools.
#[derive(Clone)]
pub struct KitchenMcpServer {
    recipes: RecipeBook,
    delivery: Arc<MockDelivery>,
    tool_router: ToolRouter<Self>,
}

impl KitchenMcpServer {
    pub fn new(recipes: RecipeBook, delivery: Arc<MockDelivery>) -> Self {
        Self {
            recipes,
            delivery,
            tool_router: Self::tool_router(),
        }
    }

    fn convert_error(err: CollaboratorError) -> McpError {
        match err {
            CollaboratorError::Rejected(msg) => McpError::invalid_params(msg, None),
            other => McpError::internal_error(other.to_string(), None),
        }
    }

    fn result_to_json<T: Serialize>(result: T) -> Result<String, McpError> {
        serde_json::to_string_pretty(&result)
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }
}

impl Default for KitchenMcpServer {
    fn default() -> Self {
        Self::new(RecipeBook::new(), Arc::new(MockDelivery::new()))
    }
}

#[tool_router]
impl KitchenMcpServer {
    #[tool(description = "Get ingredients and steps for a dish. Returns: {found, ingredients, steps, suggestions}")]
    async fn get_recipe(
        &self,
        Parameters(params): Parameters<GetRecipeParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("📖 Recipe lookup: '{}'", crate::safe_truncate(&params.dish_name, 50));

        let response = self.recipes.lookup(&params.dish_name);
        if !response.found {
            warn!("No recipe for '{}'", params.dish_name);
        }

        let json = Self::result_to_json(&response)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Compare required ingredients against available ones (case-insensitive). Returns: {missing_ingredients}")]
    async fn compare_ingredients(
        &self,
        Parameters(params): Parameters<CompareIngredientsParams>,
    ) -> Result<CallToolResult, McpError> {
        let missing = self
            .delivery
            .compare_ingredients(&params.required, &params.available);

        info!("🧮 {} of {} ingredients missing", missing.len(), params.required.len());

        let json = Self::result_to_json(json!({ "missing_ingredients": missing }))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Order grocery items for delivery. Returns: {order_id, total}")]
    async fn place_order(
        &self,
        Parameters(params): Parameters<PlaceOrderParams>,
    ) -> Result<CallToolResult, McpError> {
        let items = params.items.into_iter().collect();
        let response = self.delivery.order(&items).map_err(Self::convert_error)?;

        info!("🛒 Order {} placed", response.order_id);

        let json = Self::result_to_json(&response)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Get the delivery status of an order: processing, out_for_delivery or delivered. Returns: {order_id, status, items, total}")]
    async fn get_order_status(
        &self,
        Parameters(params): Parameters<GetOrderStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let report = self
            .delivery
            .order_status(&params.order_id)
            .map_err(Self::convert_error)?;

        info!("🚚 Order {} is {}", report.order_id, report.status);

        let json = Self::result_to_json(&report)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for KitchenMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mise-kitchen".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Kitchen tools for a cooking assistant. Use get_recipe to look up a dish, \
                 compare_ingredients to find what is missing, place_order to buy it, and \
                 get_order_status to track delivery."
                    .to_string(),
            ),
        }
    }
}


pub async fn run_server() -> anyhow::Result<()> {
    info!("🚀 Initializing Mise kitchen MCP server...");

    let server = KitchenMcpServer::default();
    info!("✅ Kitchen MCP server ready ({} recipes)", server.recipes.dishes().len());

    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(result: &CallToolResult) -> serde_json::Value {
        let value = serde_json::to_value(result).unwrap();
        let text = value["content"][0]["text"].as_str().unwrap().to_string();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_get_recipe_tool() {
        let server = KitchenMcpServer::default();
        let result = server
            .get_recipe(Parameters(GetRecipeParams {
                dish_name: "Pasta Carbonara".to_string(),
            }))
            .await
            .unwrap();

        let body = text_of(&result);
        assert_eq!(body["found"], true);
        assert_eq!(body["ingredients"][0], "spaghetti");
    }

    #[tokio::test]
    async fn test_compare_ingredients_tool() {
        let server = KitchenMcpServer::default();
        let result = server
            .compare_ingredients(Parameters(CompareIngredientsParams {
                required: vec!["Rice".to_string(), "onion".to_string()],
                available: vec!["ONION".to_string()],
            }))
            .await
            .unwrap();

        assert_eq!(text_of(&result)["missing_ingredients"], json!(["Rice"]));
    }

    #[tokio::test]
    async fn test_order_then_status() {
        let server = KitchenMcpServer::default();
        let placed = server
            .place_order(Parameters(PlaceOrderParams {
                items: vec!["rice".to_string()],
            }))
            .await
            .unwrap();
        let order_id = text_of(&placed)["order_id"].as_str().unwrap().to_string();

        let status = server
            .get_order_status(Parameters(GetOrderStatusParams { order_id }))
            .await
            .unwrap();
        assert_eq!(text_of(&status)["status"], "processing");
    }

    #[tokio::test]
    async fn test_unknown_order_is_invalid_params() {
        let server = KitchenMcpServer::default();
        let err = server
            .get_order_status(Parameters(GetOrderStatusParams {
                order_id: "missing".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn test_server_advertises_tools() {
        let info = KitchenMcpServer::default().get_info();
        assert!(info.capabilities.tools.is_some());
        assert_eq!(info.server_info.name, "mise-kitchen");
    }
}
