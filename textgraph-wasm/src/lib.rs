//! WASM bindings for textgraph, used by the browser editor to validate and
//! preview graphs without a server round-trip.

use wasm_bindgen::prelude::*;

use textgraph::core::engine::{Generation, GenerationFailure, GraphEngine, TraceStep};
use textgraph::core::validate::validate;
use textgraph::schema::document::GraphDocument;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct ValidationReport {
    valid: bool,
    errors: Vec<String>,
}

#[derive(serde::Serialize)]
struct RunReport<'a> {
    seed: u64,
    output: Option<&'a str>,
    error: Option<String>,
    trace: &'a [TraceStep],
}

impl<'a> RunReport<'a> {
    fn new(seed: u64, result: &'a Result<Generation, GenerationFailure>) -> Self {
        match result {
            Ok(generation) => RunReport {
                seed,
                output: Some(&generation.output),
                error: None,
                trace: &generation.trace.steps,
            },
            Err(failure) => RunReport {
                seed,
                output: None,
                error: Some(failure.error.to_string()),
                trace: &failure.trace.steps,
            },
        }
    }
}

fn parse(document_json: &str) -> Result<GraphDocument, JsError> {
    GraphDocument::parse_json(document_json)
        .map_err(|e| JsError::new(&format!("Invalid document JSON: {e}")))
}

/// Validate a document and return `{ "valid": bool, "errors": [..] }`.
#[wasm_bindgen]
pub fn validate_document(document_json: &str) -> Result<String, JsError> {
    let document = parse(document_json)?;
    let errors = match validate(&document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };
    let report = ValidationReport {
        valid: errors.is_empty(),
        errors,
    };
    serde_json::to_string(&report).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

/// Run `count` generations seeded `seed, seed + 1, ...` and return one
/// report per run, each with its output or error and its trace.
#[wasm_bindgen]
pub fn generate(document_json: &str, seed: u64, count: usize) -> Result<String, JsError> {
    let document = parse(document_json)?;
    let mut engine = GraphEngine::builder()
        .seed(seed)
        .build(&document)
        .map_err(|e| JsError::new(&e.to_string()))?;
    let results = engine.generate_many(count);
    let reports: Vec<RunReport<'_>> = results
        .iter()
        .enumerate()
        .map(|(i, result)| RunReport::new(seed.wrapping_add(i as u64), result))
        .collect();
    serde_json::to_string(&reports).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

/// A compiled graph that keeps its seed sequence between calls, for the
/// editor's "generate again" button.
#[wasm_bindgen]
pub struct GraphPreview {
    engine: GraphEngine<'static>,
}

#[wasm_bindgen]
impl GraphPreview {
    #[wasm_bindgen(constructor)]
    pub fn new(document_json: &str, seed: u64) -> Result<GraphPreview, JsError> {
        let document = parse(document_json)?;
        let engine = GraphEngine::builder()
            .seed(seed)
            .build_owned(document)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(GraphPreview { engine })
    }

    /// Generate the next output in the sequence as a run report.
    pub fn next_run(&mut self) -> Result<String, JsError> {
        let seed = self.engine.seed().wrapping_add(self.engine.generation_count());
        let result = self.engine.generate();
        serde_json::to_string(&RunReport::new(seed, &result))
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    pub fn reset(&mut self) {
        let seed = self.engine.seed();
        self.engine.reseed(seed);
    }

    pub fn node_count(&self) -> usize {
        self.engine.graph().document().nodes.len()
    }
}
