//! Schema normalization, prompt building, chunk/merge and cost
//! accounting properties of the extraction agent.

use proptest::prelude::*;
use serde_json::json;

use anycrawl::llm::chunk::{chunk_by_lines, merge_results};
use anycrawl::llm::cost::{CostEntry, CostLedger, TokenUsage};
use anycrawl::llm::models::ModelConfig;
use anycrawl::llm::prompt::build_field_prompt;
use anycrawl::llm::schema::{normalize, prune_to_schema, unwrap_items};
use anycrawl::llm::tokens::TokenCounter;

fn model() -> ModelConfig {
    ModelConfig {
        id: "test-model".into(),
        model_name: None,
        base_url: "https://api.test/v1".into(),
        api_key: None,
        max_input_tokens: 4_000,
        max_output_tokens: 500,
        input_price: 2e-6,
        output_price: 6e-6,
    }
}

#[test]
fn token_totals_are_consistent() {
    let mut ledger = CostLedger::new(None);
    let m = model();
    for (input, output) in [(100u64, 30u64), (250, 80), (90, 10)] {
        ledger.record(CostEntry {
            call_type: "extract_chunk".into(),
            metadata: json!({}),
            model: m.id.clone(),
            tokens: TokenUsage::new(input, output),
            cost: m.call_cost(input, output),
        });
    }

    let usage = ledger.total_tokens();
    assert_eq!(usage.total, usage.input + usage.output);

    let expected: f64 = [(100u64, 30u64), (250, 80), (90, 10)]
        .iter()
        .map(|(i, o)| m.call_cost(*i, *o))
        .sum();
    assert!((ledger.total_cost() - expected).abs() < 1e-12);
}

#[test]
fn cost_limit_blocks_before_dispatch() {
    let m = model();
    let mut ledger = CostLedger::new(Some(0.001));
    ledger.record(CostEntry {
        call_type: "extract".into(),
        metadata: json!({}),
        model: m.id.clone(),
        tokens: TokenUsage::new(300, 100),
        cost: 0.0009,
    });
    assert!(ledger.check_budget(0.00005).is_ok());
    assert!(ledger.check_budget(0.0002).is_err());
}

#[test]
fn object_schema_output_has_no_extra_keys() {
    let schema = json!({
        "type": "object",
        "properties": {
            "company": {"type": "string"},
            "services": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["company"]
    });
    let normalized = normalize(&schema);

    let model_output = json!({
        "company": "ACME",
        "services": ["a", "b"],
        "confidence": 0.93,
        "reasoning": "made up"
    });
    let pruned = prune_to_schema(model_output, &normalized.schema, 0);
    let keys: Vec<&String> = pruned.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["company", "services"]);
}

#[test]
fn long_input_chunks_and_merges_without_duplicates() {
    let counter = TokenCounter::Estimate;
    let m = model();

    let content: String =
        (0..2_000).map(|i| format!("service entry number {i}\n")).collect();
    let budget = m.input_budget(100);
    let chunks = chunk_by_lines(&content, budget, m.chunk_overlap(), &counter);
    assert!(chunks.len() > 1, "50k-char input must chunk");

    // Simulated per-chunk outputs with overlap-induced repeats.
    let merged = merge_results(vec![
        json!({"company": "ACME", "services": ["alpha", "beta"]}),
        json!({"company": "", "services": ["beta", "gamma"]}),
        json!({"company": "", "services": ["gamma", "delta"]}),
    ]);

    assert_eq!(merged["company"], "ACME");
    let services: Vec<&str> =
        merged["services"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(services, ["alpha", "beta", "gamma", "delta"], "deduped, order-preserving");
}

#[test]
fn field_prompt_lists_nested_structure() {
    let schema = json!({
        "company": {"type": "string", "description": "Legal entity name"},
        "services": {"type": "array", "items": {"type": "string"}}
    });
    let normalized = normalize(&schema);
    let prompt = build_field_prompt(&normalized.schema);
    assert!(prompt.contains("- company (string): Legal entity name"));
    assert!(prompt.contains("- services (array of string)"));
}

#[test]
fn array_wrap_roundtrip() {
    let schema = json!({"type": "array", "items": {"type": "number"}});
    let normalized = normalize(&schema);
    assert!(normalized.unwrap_items);
    assert_eq!(unwrap_items(json!({"items": [1, 2, 3]})), json!([1, 2, 3]));
}

proptest! {
    /// Normalization is idempotent for arbitrary property maps.
    #[test]
    fn normalization_idempotent(keys in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
        let mut properties = serde_json::Map::new();
        for key in &keys {
            properties.insert(key.clone(), json!({"type": "string", "default": "x"}));
        }
        let schema = serde_json::Value::Object(properties);

        let once = normalize(&schema);
        let twice = normalize(&once.schema);
        prop_assert_eq!(&once.schema, &twice.schema);
        prop_assert!(!twice.unwrap_items);
    }

    /// Chunking never loses content lines (modulo the overlap repeats).
    #[test]
    fn chunking_covers_every_line(line_count in 1usize..200) {
        let content: String = (0..line_count).map(|i| format!("line-{i}\n")).collect();
        let counter = TokenCounter::Estimate;
        let chunks = chunk_by_lines(content.trim_end(), 40, 8, &counter);
        let joined = chunks.join("\n");
        for i in 0..line_count {
            let needle = format!("line-{}", i);
            prop_assert!(joined.contains(&needle));
        }
    }
}
