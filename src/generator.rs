/**
 * Generator Capability
 *
 * DESIGN DECISION: An injected trait rather than a concrete LLM client
 * WHY: LLM-provider HTTP glue is explicitly out of scope; the Resolver's
 * GENERATE path and the Reflector's healing refine step both need "ask
 * something smarter for code", and a trait seam lets a host application
 * plug in whatever capability it has without this crate depending on any
 * particular provider
 *
 * PATTERN: Injected async capability trait (the same `#[async_trait]`
 * seam this codebase uses for its domain-specific agent roles)
 */

use crate::error::Result;
use async_trait::async_trait;

/// A single generation request: a natural-language description plus
/// optional constraints gathered from intent parsing or a healing pass.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub description: String,
    pub language: Option<crate::pattern::Language>,
    pub tags: Vec<String>,
    pub existing_code: Option<String>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub code: String,
    pub test_code: Option<String>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces fresh code from a description (Resolver's GENERATE path).
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Refines existing code against a list of issues (Reflector's SERF
    /// loop and the Resolver's EVOLVE healing step).
    async fn refine(&self, code: &str, issues: &[String]) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                code: format!("// {}\nfn generated() {{}}", request.description),
                test_code: None,
            })
        }

        async fn refine(&self, code: &str, _issues: &[String]) -> Result<String> {
            Ok(format!("{code}\n// refined"))
        }
    }

    #[tokio::test]
    async fn test_generator_trait_object_is_usable() {
        let generator: Box<dyn Generator> = Box::new(EchoGenerator);
        let response = generator
            .generate(GenerateRequest {
                description: "add two numbers".to_string(),
                language: None,
                tags: vec![],
                existing_code: None,
                issues: vec![],
            })
            .await
            .unwrap();
        assert!(response.code.contains("add two numbers"));

        let refined = generator.refine("fn f() {}", &["too simple".to_string()]).await.unwrap();
        assert!(refined.contains("refined"));
    }
}
