//! Taint propagator (C7.2–4, spec §4.5.2): turns superglobal usages into
//! `TaintFlow`s, then aggregates flows into `InputCarrier` records.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::carriers::superglobal::{SuperglobalUsage, UsageContext};
use crate::symbol::{AccessPattern, InputCarrier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    DirectAssignment,
    ForeachPopulation,
    MethodReturn,
    MethodCallPropagation,
}

#[derive(Debug, Clone)]
pub struct TaintFlow {
    pub source: String,
    /// Property or method name on `class_name`; `"*"` for the
    /// foreach-all-keys case.
    pub sink: String,
    pub class_name: String,
    pub is_method_sink: bool,
    pub file: String,
    pub line: u32,
    pub confidence: f32,
    pub flow_type: FlowType,
}

/// Per-method pre-analysis, computed once from `body_source` and then
/// discarded (spec §4.5.2: "the `body_source` is released to reclaim
/// memory").
#[derive(Debug, Clone, Default)]
pub struct MethodInfo {
    pub name: String,
    pub is_public: bool,
    pub first_param: Option<String>,
    pub has_this_array_assign: bool,
    pub array_assign_properties: Vec<String>,
    pub has_dynamic_prop_assign: bool,
    pub has_return_this_prop: bool,
    pub returned_properties: Vec<String>,
    /// `(property, param_name)` pairs where body has `$this->P[$k] = $param`
    /// and `$param` is one of this method's own parameters.
    pub array_assign_from_param: Vec<(String, String)>,
    /// Properties assigned directly from the method's first parameter:
    /// `$this->P = $firstParam`.
    pub direct_assign_from_first_param: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub name: String,
    pub file: String,
    pub properties: Vec<String>,
    pub methods: HashMap<String, MethodInfo>,
    pub constructor: Option<String>,
    pub parent_class: Option<String>,
}

fn array_assign_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\$this->(\w+)\[\$(\w+)\]\s*=\s*\$(\w+)").unwrap())
}

fn dynamic_prop_assign_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\$this->\$\w+\s*=").unwrap())
}

fn return_this_prop_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"return\s+\$this->(\w+)").unwrap())
}

fn direct_prop_assign_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\$this->(\w+)\s*=\s*\$(\w+)\s*;").unwrap())
}

/// Pre-analyze one method body into its three (plus helper) booleans/lists.
/// Called once per method during Phase 1, before `body_source` is released.
pub fn analyze_method_info(name: &str, is_public: bool, first_param: Option<String>, body_source: &str) -> MethodInfo {
    let mut info = MethodInfo {
        name: name.to_string(),
        is_public,
        first_param: first_param.clone(),
        ..Default::default()
    };

    for cap in array_assign_re().captures_iter(body_source) {
        let property = cap[1].to_string();
        let value_var = cap[3].to_string();
        info.has_this_array_assign = true;
        if !info.array_assign_properties.contains(&property) {
            info.array_assign_properties.push(property.clone());
        }
        if first_param.as_deref() == Some(value_var.as_str()) {
            info.array_assign_from_param.push((property, value_var));
        }
    }

    info.has_dynamic_prop_assign = dynamic_prop_assign_re().is_match(body_source);

    for cap in return_this_prop_re().captures_iter(body_source) {
        info.has_return_this_prop = true;
        let property = cap[1].to_string();
        if !info.returned_properties.contains(&property) {
            info.returned_properties.push(property);
        }
    }

    for cap in direct_prop_assign_re().captures_iter(body_source) {
        let property = cap[1].to_string();
        let rhs_var = &cap[2];
        if first_param.as_deref() == Some(rhs_var) && !info.direct_assign_from_first_param.contains(&property) {
            info.direct_assign_from_first_param.push(property);
        }
    }

    info
}

/// Recover the `SourceType` a `TaintFlow::source` string (e.g. `$_GET['id']`)
/// originated from, for the carrier aggregation step's source-type union.
fn source_type_of(source: &str) -> Option<crate::symbol::SourceType> {
    let primitive = source.split('[').next().unwrap_or(source);
    crate::parsing::catalog::catalog().php_superglobal_type(primitive)
}

fn this_property_target(expr: &str) -> Option<String> {
    let rest = expr.strip_prefix("$this->")?;
    let name = rest.split(|c: char| c == '[' || c == ' ').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Phase 2: consume one superglobal usage against the pre-built class map
/// and emit zero or more `TaintFlow`s, per the spec §4.5.2 rule table.
pub fn emit_taint_flows(usage: &SuperglobalUsage, classes: &HashMap<String, ClassInfo>) -> Vec<TaintFlow> {
    let mut flows = Vec::new();
    let source = match &usage.key {
        Some(key) => format!("{}['{}']", usage.primitive_name, key),
        None => format!("{}[*]", usage.primitive_name),
    };

    let Some(class_name) = usage.enclosing_class.clone() else {
        return flows;
    };
    let Some(class) = classes.get(&class_name) else {
        return flows;
    };

    match usage.context {
        UsageContext::Assignment => {
            if let Some(assigned_to) = &usage.assigned_to {
                if let Some(property) = this_property_target(assigned_to) {
                    flows.push(TaintFlow {
                        source,
                        sink: property,
                        class_name,
                        is_method_sink: false,
                        file: usage.file.clone(),
                        line: usage.line,
                        confidence: 1.0,
                        flow_type: FlowType::DirectAssignment,
                    });
                }
            }
        }
        UsageContext::Foreach => {
            let Some(method_name) = &usage.enclosing_method else { return flows };
            let Some(method) = class.methods.get(method_name) else { return flows };

            if method.has_this_array_assign {
                for property in &method.array_assign_properties {
                    flows.push(TaintFlow {
                        source: source.clone(),
                        sink: property.clone(),
                        class_name: class_name.clone(),
                        is_method_sink: false,
                        file: usage.file.clone(),
                        line: usage.line,
                        confidence: 1.0,
                        flow_type: FlowType::ForeachPopulation,
                    });
                }
            } else if method.has_dynamic_prop_assign {
                flows.push(TaintFlow {
                    source,
                    sink: "*".to_string(),
                    class_name,
                    is_method_sink: false,
                    file: usage.file.clone(),
                    line: usage.line,
                    confidence: 0.6,
                    flow_type: FlowType::ForeachPopulation,
                });
            }
        }
        UsageContext::Return => {
            if let Some(method_name) = &usage.enclosing_method {
                if class.methods.get(method_name).is_some_and(|m| m.is_public) {
                    flows.push(TaintFlow {
                        source,
                        sink: method_name.clone(),
                        class_name,
                        is_method_sink: true,
                        file: usage.file.clone(),
                        line: usage.line,
                        confidence: 0.95,
                        flow_type: FlowType::MethodReturn,
                    });
                }
            }
        }
        UsageContext::MethodArg => {
            let Some(called) = &usage.called_method else { return flows };
            let Some(method) = class.methods.get(called) else { return flows };

            for (property, _param) in &method.array_assign_from_param {
                flows.push(TaintFlow {
                    source: source.clone(),
                    sink: property.clone(),
                    class_name: class_name.clone(),
                    is_method_sink: false,
                    file: usage.file.clone(),
                    line: usage.line,
                    confidence: 0.8,
                    flow_type: FlowType::MethodCallPropagation,
                });
            }
            for property in &method.direct_assign_from_first_param {
                flows.push(TaintFlow {
                    source: source.clone(),
                    sink: property.clone(),
                    class_name: class_name.clone(),
                    is_method_sink: false,
                    file: usage.file.clone(),
                    line: usage.line,
                    confidence: 0.8,
                    flow_type: FlowType::MethodCallPropagation,
                });
            }
        }
        UsageContext::FunctionArg | UsageContext::ArrayElement | UsageContext::Direct => {}
    }

    flows
}

/// Phase 3/4: aggregate flows into deduplicated `InputCarrier`s, then derive
/// method carriers from property carriers whose owning class has a public
/// getter-shaped method returning that property (spec §4.5.2 Phase 4).
pub fn aggregate_carriers(flows: &[TaintFlow], classes: &HashMap<String, ClassInfo>) -> Vec<InputCarrier> {
    let mut by_key: HashMap<(String, String), InputCarrier> = HashMap::new();

    for flow in flows {
        let key = (flow.class_name.clone(), flow.sink.clone());
        let class = classes.get(&flow.class_name);
        let populated_in = class
            .and_then(|c| c.constructor.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let entry = by_key.entry(key).or_insert_with(|| {
            if flow.is_method_sink {
                InputCarrier::method(&flow.class_name, &flow.sink, &populated_in, &flow.file, flow.line, flow.confidence)
            } else {
                let access_pattern = if flow.sink == "*" { AccessPattern::Array } else { AccessPattern::Direct };
                InputCarrier::property(&flow.class_name, &flow.sink, access_pattern, &populated_in, &flow.file, flow.line, flow.confidence)
            }
        });

        entry.confidence = entry.confidence.max(flow.confidence);
        if let Some(source_type) = source_type_of(&flow.source) {
            if !entry.source_types.contains(&source_type) {
                entry.source_types.push(source_type);
            }
        }
    }

    let mut carriers: Vec<InputCarrier> = by_key.into_values().collect();

    // Phase 4: public methods that return a property carrier get their own
    // method carrier at fixed confidence 0.9.
    let mut derived = Vec::new();
    for carrier in &carriers {
        let Some(property_name) = &carrier.property_name else { continue };
        let Some(class) = classes.get(&carrier.class_name) else { continue };
        for method in class.methods.values() {
            if method.is_public && method.returned_properties.contains(property_name) {
                let key = (class.name.clone(), method.name.clone());
                if carriers.iter().any(|c| c.sink_key() == key) {
                    continue;
                }
                derived.push(InputCarrier::method(
                    &class.name,
                    &method.name,
                    class.constructor.clone().unwrap_or_else(|| "unknown".to_string()),
                    &carrier.file,
                    carrier.line,
                    0.9,
                ));
            }
        }
    }
    carriers.extend(derived);
    carriers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_method_info_detects_array_assign_from_param() {
        let info = analyze_method_info("set", true, Some("value".to_string()), "{ $this->data[$key] = $value; }");
        assert!(info.has_this_array_assign);
        assert_eq!(info.array_assign_from_param, vec![("data".to_string(), "value".to_string())]);
    }

    #[test]
    fn analyze_method_info_detects_direct_return() {
        let info = analyze_method_info("getId", true, None, "{ return $this->id; }");
        assert!(info.has_return_this_prop);
        assert_eq!(info.returned_properties, vec!["id".to_string()]);
    }

    #[test]
    fn direct_assignment_flow_targets_property() {
        let usage = SuperglobalUsage {
            primitive_name: "$_GET".to_string(),
            key: Some("id".to_string()),
            file: "a.php".to_string(),
            line: 1,
            column: 0,
            assigned_to: Some("$this->id".to_string()),
            context: UsageContext::Assignment,
            enclosing_class: Some("A".to_string()),
            enclosing_method: Some("__construct".to_string()),
            called_method: None,
            is_loop_var: false,
            loop_key_var: None,
            loop_value_var: None,
            snippet: String::new(),
        };
        let mut classes = HashMap::new();
        classes.insert("A".to_string(), ClassInfo {
            name: "A".to_string(),
            file: "a.php".to_string(),
            properties: vec!["id".to_string()],
            methods: HashMap::new(),
            constructor: Some("__construct".to_string()),
            parent_class: None,
        });

        let flows = emit_taint_flows(&usage, &classes);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].sink, "id");
        assert_eq!(flows[0].flow_type, FlowType::DirectAssignment);
    }
}
