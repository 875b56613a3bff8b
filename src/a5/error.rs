use thiserror::Error;

#[derive(Debug, Error)]
pub enum A5Error {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read response body for {0}")]
    ResponseBody(String, #[source] reqwest::Error),

    #[error("Failed to parse JSON response")]
    JsonParse(#[from] serde_json::Error),
}
