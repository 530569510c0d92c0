/// Resolves the `Access-Control-Allow-Origin` value for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsPolicy {
    AnyOrigin,
    AllowList(Vec<String>),
}

impl CorsPolicy {
    pub fn from_origins(origins: &[String]) -> Self {
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsPolicy::AnyOrigin
        } else {
            CorsPolicy::AllowList(origins.to_vec())
        }
    }

    /// `None` means the header is omitted and the browser blocks the response.
    pub fn allow_origin(&self, request_origin: Option<&str>) -> Option<String> {
        match self {
            CorsPolicy::AnyOrigin => Some(request_origin.unwrap_or("*").to_string()),
            CorsPolicy::AllowList(allowed) => request_origin
                .filter(|origin| allowed.iter().any(|a| a == origin))
                .map(str::to_string),
        }
    }
}
