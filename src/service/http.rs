use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

type BodyBuilder = Box<dyn FnOnce() -> ServiceResult<RequestBody> + Send>;

pub enum BodySource {
    Literal(RequestBody),
    Builder(BodyBuilder),
}

/// One outbound call. Built fluently by the provider clients and executed by
/// [`send`]; the body builder runs only once the request is actually sent.
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub extra_headers: Vec<(String, String)>,
    pub body: BodySource,
    pub error_message: String,
    pub include_body_in_error: bool,
    pub signal: Option<CancellationToken>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            extra_headers: Vec::new(),
            body: BodySource::Literal(RequestBody::Empty),
            error_message: "Request failed".to_string(),
            include_body_in_error: true,
            signal: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn extra_headers(mut self, headers: &[(String, String)]) -> Self {
        self.extra_headers.extend(headers.iter().cloned());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = BodySource::Literal(body);
        self
    }

    pub fn body_with<F>(mut self, builder: F) -> Self
    where
        F: FnOnce() -> ServiceResult<RequestBody> + Send + 'static,
    {
        self.body = BodySource::Builder(Box::new(builder));
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn include_body_in_error(mut self, include: bool) -> Self {
        self.include_body_in_error = include;
        self
    }

    pub fn signal(mut self, signal: Option<CancellationToken>) -> Self {
        self.signal = signal;
        self
    }
}

/// Executes the request. Non-2xx responses become [`ServiceError::Http`]
/// carrying the status and (unless disabled) the response body.
pub async fn send(client: &reqwest::Client, request: HttpRequest) -> ServiceResult<reqwest::Response> {
    if request.url.trim().is_empty() {
        return Err(ServiceError::Config("Request URL is required.".to_string()));
    }

    let body = match request.body {
        BodySource::Literal(body) => body,
        BodySource::Builder(builder) => builder()?,
    };

    let mut builder = client.request(request.method, &request.url);
    for (name, value) in request.headers.iter().chain(request.extra_headers.iter()) {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match body {
        RequestBody::Empty => builder,
        RequestBody::Text(text) => builder.body(text),
        RequestBody::Json(value) => builder.json(&value),
        RequestBody::Form(params) => builder.form(&params),
    };

    let response = match request.signal.as_ref() {
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.cancelled() => return Err(ServiceError::Cancelled),
                response = builder.send() => response?,
            }
        }
        None => builder.send().await?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = if request.include_body_in_error {
        match response.text().await {
            Ok(text) => text,
            Err(err) => format!("failed to read error body: {}", err),
        }
    } else {
        String::new()
    };
    let message = if body.is_empty() {
        format!("{} with status {}", request.error_message, status.as_u16())
    } else {
        format!(
            "{} with status {}: {}",
            request.error_message,
            status.as_u16(),
            body
        )
    };
    Err(ServiceError::Http {
        status: status.as_u16(),
        body,
        message,
    })
}

pub async fn send_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    request: HttpRequest,
) -> ServiceResult<T> {
    let response = send(client, request).await?;
    Ok(response.json::<T>().await?)
}
