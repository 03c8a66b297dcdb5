//! JSON Schema validation for tool inputs

use jsonschema::Validator;
use serde_json::Value;

/// Compile a tool input schema, rejecting documents that are not valid JSON Schema
pub fn compile_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::validator_for(schema).map_err(|e| format!("Invalid JSON schema: {e}"))
}

/// Validate tool arguments against a compiled schema
pub fn validate_input(validator: &Validator, input: &Value) -> Result<(), String> {
    if let Err(error) = validator.validate(input) {
        return Err(format!("Input validation failed: {error}"));
    }
    Ok(())
}

/// Normalize missing or null tool arguments to an empty object
pub fn parse_arguments(arguments: Option<Value>) -> Value {
    match arguments {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value,
    }
}
