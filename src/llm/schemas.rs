use serde_json::{json, Value};

/// JSON Schema for the Pass 1 candidate segment list (C1).
pub fn segment_list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "segments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "segment_id": {"type": "string"},
                        "title": {"type": "string"},
                        "primary_speaker": {"type": "string"},
                        "severity_hint": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "harm_category": {
                            "type": "object",
                            "properties": {
                                "primary": {"type": "string"},
                                "subtypes": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["primary"]
                        },
                        "rhetorical_strategies": {"type": "array", "items": {"type": "string"}},
                        "societal_impacts": {"type": "array", "items": {"type": "string"}},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "reasoning": {"type": "string"},
                        "clip_context_description": {"type": "string"},
                        "quotes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "timestamp": {"type": "number"},
                                    "speaker": {"type": "string"},
                                    "quote": {"type": "string"}
                                },
                                "required": ["timestamp", "speaker", "quote"]
                            }
                        },
                        "context_range": {
                            "type": "object",
                            "properties": {"start": {"type": "number"}, "end": {"type": "number"}},
                            "required": ["start", "end"]
                        },
                        "duration_seconds": {"type": "number"}
                    },
                    "required": [
                        "segment_id", "title", "primary_speaker", "severity_hint", "harm_category",
                        "confidence", "reasoning", "clip_context_description", "quotes", "context_range",
                        "duration_seconds"
                    ]
                }
            }
        },
        "required": ["segments"]
    })
}

/// JSON Schema for the composite five-gate verdict (C2).
pub fn gate_verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "segment_id": {"type": "string"},
            "gates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "gate_id": {
                            "type": "string",
                            "enum": ["rebuttability", "verifiability", "accuracy_at_risk", "harm", "context_sufficiency"]
                        },
                        "passed": {"type": "boolean"},
                        "reason": {"type": "string"},
                        "evidence": {"type": ["string", "null"]}
                    },
                    "required": ["gate_id", "passed", "reason"]
                },
                "minItems": 5,
                "maxItems": 5
            }
        },
        "required": ["segment_id", "gates"]
    })
}

/// JSON Schema for parsing a grounded call's freeform text into a
/// `VerificationVerdict` (C3, C9's per-claim check).
pub fn verification_verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "kind": {"type": "string", "enum": ["confirmed_false", "confirmed_true", "unverified", "not_applicable"]},
            "sources": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "url": {"type": "string"},
                        "title": {"type": "string"},
                        "snippet": {"type": "string"}
                    },
                    "required": ["url", "title", "snippet"]
                }
            },
            "rationale": {"type": "string"}
        },
        "required": ["kind", "rationale"]
    })
}

/// JSON Schema for the diversity-topic classifier fallback (C4), used
/// only when keyword-overlap based topic assignment is ambiguous.
pub fn diversity_topic_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topic": {"type": "string", "description": "a short, stable topic label for this segment"}
        },
        "required": ["topic"]
    })
}

/// JSON Schema for C5's relaxed "second opinion" re-evaluation.
pub fn recovery_verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "readmit": {"type": "boolean"},
            "reason": {"type": "string"}
        },
        "required": ["readmit", "reason"]
    })
}

/// JSON Schema for the structure plan (C6a).
pub fn structure_plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hook_segment_id": {"type": ["string", "null"]},
            "entries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "segment_id": {"type": "string"},
                        "order": {"type": "integer"},
                        "pre_clip_est_s": {"type": "number"},
                        "post_clip_est_s": {"type": "number"},
                        "clip_padding_s": {"type": "number"}
                    },
                    "required": ["segment_id", "order", "pre_clip_est_s", "post_clip_est_s", "clip_padding_s"]
                }
            },
            "dropped": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "segment_id": {"type": "string"},
                        "justification": {"type": "string"}
                    },
                    "required": ["segment_id", "justification"]
                }
            },
            "intro_stub": {"type": "string"},
            "outro_stub": {"type": "string"}
        },
        "required": ["entries", "intro_stub", "outro_stub"]
    })
}

/// JSON Schema for the creative script (C6b).
pub fn creative_script_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "intro_text": {"type": "string"},
            "outro_text": {"type": "string"},
            "target_audience": {"type": "string"},
            "key_themes": {"type": "array", "items": {"type": "string"}},
            "clip_texts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "segment_id": {"type": "string"},
                        "pre_clip_text": {"type": "string"},
                        "post_clip_rebuttal_text": {"type": "string"}
                    },
                    "required": ["segment_id", "pre_clip_text", "post_clip_rebuttal_text"]
                }
            }
        },
        "required": ["intro_text", "outro_text", "clip_texts"]
    })
}

/// JSON Schema for the four-gate rebuttal verdict (C8).
pub fn rebuttal_gate_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "gates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "gate_id": {"type": "string", "enum": ["grounded", "on_target", "tone_consistent", "safe"]},
                        "passed": {"type": "boolean"},
                        "reason": {"type": "string"}
                    },
                    "required": ["gate_id", "passed", "reason"]
                },
                "minItems": 4,
                "maxItems": 4
            }
        },
        "required": ["gates"]
    })
}

/// JSON Schema for a single rewrite response (C8).
pub fn rewrite_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "rebuttal_text": {"type": "string"} },
        "required": ["rebuttal_text"]
    })
}

/// JSON Schema for the external fact-validation pass (C9): which claims
/// within a rebuttal were flagged and what the grounded check found.
pub fn fact_validation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "flagged_claims": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "claim": {"type": "string"},
                        "verdict": {"type": "string", "enum": ["confirmed_false", "confirmed_true", "unverified", "not_applicable"]},
                        "rationale": {"type": "string"},
                        "sources": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "url": {"type": "string"},
                                    "title": {"type": "string"},
                                    "snippet": {"type": "string"}
                                },
                                "required": ["url", "title", "snippet"]
                            }
                        }
                    },
                    "required": ["claim", "verdict", "rationale"]
                }
            }
        },
        "required": ["flagged_claims"]
    })
}
