use serde::Deserialize;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBotFlowRequest {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub branch_id: Option<String>,
    pub whatsapp_account_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    pub body: Option<String>,
    pub whatsapp_account_id: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub capability: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}
