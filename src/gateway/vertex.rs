use thiserror::Error;

pub const DEFAULT_VERTEX_LOCATION: &str = "global";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathRewriteError {
    #[error("path has no `models` segment: {0}")]
    MissingModelsSegment(String),
    #[error("path ends at `models` without a model: {0}")]
    MissingModel(String),
}

/// Maps a Generative Language path such as
/// `/v1beta/models/gemini-pro:generateContent` onto the Vertex AI
/// publisher form, keeping every segment from `models` on.
pub fn rewrite_path_for_vertex_ai(
    path: &str,
    project_id: &str,
    location: &str,
) -> Result<String, PathRewriteError> {
    let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let models_idx = segments
        .iter()
        .position(|part| *part == "models")
        .ok_or_else(|| PathRewriteError::MissingModelsSegment(path.to_string()))?;
    if models_idx + 1 >= segments.len() {
        return Err(PathRewriteError::MissingModel(path.to_string()));
    }

    Ok(format!(
        "/v1/projects/{project_id}/locations/{location}/publishers/google/{}",
        segments[models_idx..].join("/")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_generate_content_path() {
        assert_eq!(
            rewrite_path_for_vertex_ai(
                "/v1beta/models/gemini-pro:generateContent",
                "proj1",
                DEFAULT_VERTEX_LOCATION
            )
            .unwrap(),
            "/v1/projects/proj1/locations/global/publishers/google/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn keeps_trailing_segments_and_collapses_empty_ones() {
        assert_eq!(
            rewrite_path_for_vertex_ai("//v1//models/m1/extra/", "p", "us-central1").unwrap(),
            "/v1/projects/p/locations/us-central1/publishers/google/models/m1/extra"
        );
    }

    #[test]
    fn uses_first_models_segment() {
        assert_eq!(
            rewrite_path_for_vertex_ai("/a/models/m1/models/m2", "p", "global").unwrap(),
            "/v1/projects/p/locations/global/publishers/google/models/m1/models/m2"
        );
    }

    #[test]
    fn rejects_paths_without_a_model() {
        assert_eq!(
            rewrite_path_for_vertex_ai("/v1beta/files", "p", "global"),
            Err(PathRewriteError::MissingModelsSegment(
                "/v1beta/files".to_string()
            ))
        );
        assert_eq!(
            rewrite_path_for_vertex_ai("/v1beta/models", "p", "global"),
            Err(PathRewriteError::MissingModel("/v1beta/models".to_string()))
        );
        assert!(rewrite_path_for_vertex_ai("", "p", "global").is_err());
    }
}
