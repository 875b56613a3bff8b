use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhosError {
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

    #[error("Failed to parse GetVariables XML")]
    XmlParse(#[from] quick_xml::Error),

    #[error("GetVariables response contains no variables")]
    EmptyVariableMapping,

    #[error("Failed to write geoJSON snapshot '{0}'")]
    SnapshotWrite(std::path::PathBuf, #[source] std::io::Error),
}
