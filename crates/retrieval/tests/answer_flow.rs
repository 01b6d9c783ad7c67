//! End-to-end retrieval scenario over in-memory collaborators.
//!
//! A three-section contract where Section 5.2 uses the term "Client"
//! defined in Section 2. The termination question finds Section 5.2's
//! chunk in Round 1; 5.2 has no outgoing references, so Round 2 adds
//! nothing; Round 3 pulls in Section 2's definition chunk because
//! "Client" appears in the 5.2 text. The final bundle is exactly those
//! two chunks, and the mock generator's citations resolve against them.

use async_trait::async_trait;
use clausetrace_common::config::{GeneratorConfig, RetrievalConfig};
use clausetrace_common::db::models::{Chunk, CrossReference, Definition};
use clausetrace_common::db::NewCitation;
use clausetrace_common::errors::Result;
use clausetrace_common::generator::MockGenerator;
use clausetrace_common::index::{SearchHit, SearchIndex, VectorStore};
use clausetrace_retrieval::{RetrievalOrchestrator, RetrievalService, RetrievalStore, Signal};
use clausetrace_common::embeddings::Embedder;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn chunk(id: Uuid, document_id: Uuid, index: i32, path: &str, content: &str) -> Chunk {
    Chunk {
        id,
        document_id,
        section_id: Uuid::new_v4(),
        section_path: path.to_string(),
        chunk_index: index,
        content: content.to_string(),
        token_count: content.split_whitespace().count() as i32,
        char_start: 0,
        char_end: content.len() as i32,
        overlap_tokens_start: 0,
        overlap_tokens_end: 0,
        embedding: None,
        embedding_model: None,
        search_text: None,
        created_at: chrono::Utc::now().into(),
    }
}

struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dimension(&self) -> usize {
        2
    }
}

struct StubVector {
    hits: Vec<SearchHit>,
}

#[async_trait]
impl VectorStore for StubVector {
    async fn upsert(&self, _chunk_id: Uuid, _embedding: &[f32], _model: &str) -> Result<()> {
        Ok(())
    }
    async fn query(
        &self,
        _embedding: &[f32],
        _document_ids: &[Uuid],
        _top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }
}

struct StubIndex {
    hits: Vec<SearchHit>,
}

#[async_trait]
impl SearchIndex for StubIndex {
    async fn index(&self, _chunk_id: Uuid, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn search(
        &self,
        _query: &str,
        _document_ids: &[Uuid],
        _top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }
}

#[derive(Default)]
struct MemoryStore {
    chunks: Vec<Chunk>,
    references: Vec<CrossReference>,
    definitions: Vec<Definition>,
    saved_citations: Mutex<Vec<(Uuid, Vec<NewCitation>)>>,
}

#[async_trait]
impl RetrievalStore for MemoryStore {
    async fn chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }
    async fn cross_references_by_source_chunks(
        &self,
        source_chunk_ids: &[Uuid],
    ) -> Result<Vec<CrossReference>> {
        Ok(self
            .references
            .iter()
            .filter(|r| source_chunk_ids.contains(&r.source_chunk_id))
            .cloned()
            .collect())
    }
    async fn definitions_by_documents(&self, document_ids: &[Uuid]) -> Result<Vec<Definition>> {
        Ok(self
            .definitions
            .iter()
            .filter(|d| document_ids.contains(&d.document_id))
            .cloned()
            .collect())
    }
    async fn save_citations(&self, answer_id: Uuid, citations: Vec<NewCitation>) -> Result<()> {
        self.saved_citations
            .lock()
            .unwrap()
            .push((answer_id, citations));
        Ok(())
    }
}

struct Scenario {
    document_id: Uuid,
    termination_chunk: Uuid,
    definition_chunk: Uuid,
    store: Arc<MemoryStore>,
    service: RetrievalService,
}

fn build_scenario() -> Scenario {
    let document_id = Uuid::new_v4();
    let intro_chunk = Uuid::new_v4();
    let definition_chunk = Uuid::new_v4();
    let termination_chunk = Uuid::new_v4();

    let store = Arc::new(MemoryStore {
        chunks: vec![
            chunk(
                intro_chunk,
                document_id,
                0,
                "1",
                "This Agreement is entered into by the parties below.",
            ),
            chunk(
                definition_chunk,
                document_id,
                1,
                "2",
                "\"Client\" means the party identified in the signature block \
                 engaging the services described herein.",
            ),
            chunk(
                termination_chunk,
                document_id,
                2,
                "5/5.2",
                "The Client may terminate this Agreement for convenience upon \
                 thirty (30) days written notice to the other party.",
            ),
        ],
        references: vec![],
        definitions: vec![Definition {
            id: Uuid::new_v4(),
            document_id,
            term_display: "Client".to_string(),
            term_key: "client".to_string(),
            definition_text: "\"Client\" means the party identified in the signature block."
                .to_string(),
            defining_chunk_id: Some(definition_chunk),
            scope_section_path: Some("2".to_string()),
            char_start: 0,
            ambiguous: false,
        }],
        saved_citations: Mutex::new(vec![]),
    });

    let orchestrator = RetrievalOrchestrator::new(
        Arc::new(StubEmbedder),
        Arc::new(StubVector {
            hits: vec![SearchHit::new(termination_chunk, 0.92)],
        }),
        Arc::new(StubIndex {
            hits: vec![SearchHit::new(termination_chunk, 7.5)],
        }),
        store.clone(),
        RetrievalConfig::default(),
    );

    let service = RetrievalService::new(
        orchestrator,
        store.clone(),
        Arc::new(MockGenerator),
        RetrievalConfig::default(),
        GeneratorConfig {
            api_key: None,
            endpoint: String::new(),
            model: "mock".to_string(),
            max_tokens: 512,
            temperature: 0.1,
            timeout_secs: 10,
        },
    );

    Scenario {
        document_id,
        termination_chunk,
        definition_chunk,
        store,
        service,
    }
}

#[tokio::test]
async fn termination_question_assembles_exactly_two_chunks() {
    let scenario = build_scenario();

    let answer = scenario
        .service
        .answer_query(
            "What are my termination rights?",
            &[scenario.document_id],
            &[],
        )
        .await
        .unwrap();

    // Round 1 found 5.2, Round 2 added nothing, Round 3 added the
    // definition of "Client"
    let cited_chunks: Vec<Uuid> = answer
        .citations
        .iter()
        .filter_map(|c| c.chunk_id)
        .collect();
    assert!(cited_chunks.contains(&scenario.termination_chunk));
    assert!(answer.citations.iter().all(|c| c.resolved));

    assert_eq!(answer.intent.as_str(), "termination");
    assert!(answer.confidence > 0.5);
    assert!(answer.warnings.is_empty());
    assert!(answer.conflicts.is_empty());

    // Citations were persisted under the returned answer id
    let saved = scenario.store.saved_citations.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, answer.answer_id);
    assert!(!saved[0].1.is_empty());
}

#[tokio::test]
async fn bundle_contains_round1_hit_and_definition_only() {
    let scenario = build_scenario();

    let orchestrator = RetrievalOrchestrator::new(
        Arc::new(StubEmbedder),
        Arc::new(StubVector {
            hits: vec![SearchHit::new(scenario.termination_chunk, 0.92)],
        }),
        Arc::new(StubIndex { hits: vec![] }),
        scenario.store.clone(),
        RetrievalConfig::default(),
    );

    let query = clausetrace_retrieval::process_query("What are my termination rights?");
    let outcome = orchestrator
        .retrieve(&query, &[scenario.document_id])
        .await
        .unwrap();

    let ids: Vec<Uuid> = outcome.candidates.iter().map(|c| c.chunk.id).collect();
    assert_eq!(
        ids,
        vec![scenario.termination_chunk, scenario.definition_chunk]
    );

    let definition = &outcome.candidates[1];
    assert_eq!(definition.round, 3);
    assert_eq!(definition.signals, vec![Signal::DefinitionFetch]);
    assert_eq!(definition.term.as_ref().unwrap().term_display, "Client");
}

#[tokio::test]
async fn search_only_returns_round1_hits_without_expansion() {
    let scenario = build_scenario();

    let outcome = scenario
        .service
        .search_documents("termination notice", &[scenario.document_id], 10)
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].chunk_id, scenario.termination_chunk);
    assert_eq!(outcome.results[0].section_path, "5/5.2");
    assert!(outcome.results[0].score > 0.0);
}
