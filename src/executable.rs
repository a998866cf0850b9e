use crate::prelude::graphql::*;
use apollo_parser::ast;
use async_trait::async_trait;
use serde_json::json;
use typed_builder::TypedBuilder;
use url::Url;

/// Anything able to answer a GraphQL document for one location.
///
/// [`HttpExecutable`] is the stock transport; tests and embedded locations
/// implement this directly.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, document: &str, variables: Object) -> Result<Response, FetchError>;
}

/// Posts documents to a location over HTTP as `{query, variables}` JSON.
///
/// When `upload_types` names the schema's file scalar types, string values
/// of so-typed variables are treated as file paths and the request switches
/// to the multipart form convention (`operations` + `map` + numbered parts).
#[derive(TypedBuilder)]
pub struct HttpExecutable {
    #[builder(setter(into))]
    location: String,
    url: Url,
    #[builder(default)]
    headers: Vec<(String, String)>,
    #[builder(default)]
    upload_types: Vec<String>,
    #[builder(default = reqwest::Client::new())]
    client: reqwest::Client,
}

#[async_trait]
impl Executable for HttpExecutable {
    #[tracing::instrument(skip_all, level = "debug", fields(location = self.location.as_str()))]
    async fn execute(&self, document: &str, variables: Object) -> Result<Response, FetchError> {
        let mut request = self.client.post(self.url.clone());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let mut variables = variables;
        let files = if self.upload_types.is_empty() {
            Vec::new()
        } else {
            extract_file_uploads(
                &upload_variable_names(document, &self.upload_types),
                &mut variables,
            )
        };

        let request = if files.is_empty() {
            request.json(&json!({ "query": document, "variables": variables }))
        } else {
            request.multipart(self.upload_form(document, &variables, files).await?)
        };

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::SubrequestHttpError {
                location: self.location.clone(),
                reason: err.to_string(),
            })?;
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::SubrequestHttpError {
                location: self.location.clone(),
                reason: err.to_string(),
            })?;

        Response::from_slice(&self.location, &body)
    }
}

impl HttpExecutable {
    // https://github.com/jaydenseric/graphql-multipart-request-spec
    async fn upload_form(
        &self,
        document: &str,
        variables: &Object,
        files: Vec<(String, String)>,
    ) -> Result<reqwest::multipart::Form, FetchError> {
        let operations = json!({ "query": document, "variables": variables }).to_string();
        let mut map = Object::new();
        for (i, (pointer, _)) in files.iter().enumerate() {
            map.insert(i.to_string(), json!([pointer]));
        }

        let mut form = reqwest::multipart::Form::new()
            .text("operations", operations)
            .text("map", Value::Object(map).to_string());

        for (i, (_, path)) in files.into_iter().enumerate() {
            let bytes =
                tokio::fs::read(&path)
                    .await
                    .map_err(|err| FetchError::SubrequestHttpError {
                        location: self.location.clone(),
                        reason: format!("could not read upload {}: {}", path, err),
                    })?;
            let file_name = std::path::Path::new(&path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());
            form = form.part(
                i.to_string(),
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }

        Ok(form)
    }
}

/// Names of the document's variables declared with one of the given upload
/// scalar types.
fn upload_variable_names(document: &str, upload_types: &[String]) -> Vec<String> {
    let parser = apollo_parser::Parser::new(document);
    let tree = parser.parse();
    if tree.errors().next().is_some() {
        failfast_debug!("could not parse outgoing document for uploads");
        return Vec::new();
    }

    let mut names = Vec::new();
    for definition in tree.document().definitions() {
        if let ast::Definition::OperationDefinition(operation) = definition {
            for definition in operation
                .variable_definitions()
                .iter()
                .flat_map(|x| x.variable_definitions())
            {
                let name = match definition.variable().and_then(|x| x.name()) {
                    Some(name) => name.text().to_string(),
                    None => continue,
                };
                let is_upload = definition
                    .ty()
                    .map(FieldType::from)
                    .as_ref()
                    .and_then(FieldType::inner_type_name)
                    .map(|inner| upload_types.iter().any(|t| t == inner))
                    .unwrap_or(false);
                if is_upload {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// Replace upload-typed variable values with `null`, returning
/// `(json pointer, file path)` pairs in extraction order. Upload values
/// nest one list level deep at most.
fn extract_file_uploads(names: &[String], variables: &mut Object) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for name in names {
        match variables.get_mut(name) {
            Some(value @ Value::String(_)) => {
                let path = value
                    .as_str()
                    .expect("matched a string just above; qed")
                    .to_string();
                files.push((format!("variables.{}", name), path));
                *value = Value::Null;
            }
            Some(Value::Array(items)) => {
                for (i, item) in items.iter_mut().enumerate() {
                    if let Value::String(path) = item {
                        files.push((format!("variables.{}.{}", name, i), path.clone()));
                        *item = Value::Null;
                    }
                }
            }
            _ => {}
        }
    }
    files
}
