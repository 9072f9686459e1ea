use serde_json::Value;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function as an OpenAPI schema object
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

impl FunctionDeclaration {
    pub fn new(name: &str, description: &str, parameters: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> Option<&Value> {
        self.parameters.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// A function call requested by the model. `id` must be echoed back in
/// exactly one [`FunctionResponse`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl FunctionCall {
    pub fn new(id: &str, name: &str, args: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    pub fn new(id: String, name: String, response: Value) -> Self {
        Self { id, name, response }
    }
}
