use lazy_static::lazy_static;
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use parking_lot::Mutex;

lazy_static! {
    static ref GLOBAL_ATTRIBUTES: Mutex<Vec<KeyValue>> = Mutex::new(Vec::new());
}

// Build the resource all exported telemetry is attached to
pub fn build_resource(service_name: String, attributes: Vec<KeyValue>) -> Resource {
    let mut resource_builder = Resource::builder().with_service_name(service_name);

    for attribute in attributes {
        resource_builder = resource_builder.with_attribute(attribute);
    }

    resource_builder.build()
}

pub fn set_global_attributes(attributes: Vec<KeyValue>) {
    *GLOBAL_ATTRIBUTES.lock() = attributes;
}

/// Merges the process-wide global labels with per-measurement attributes.
pub fn build_attributes(attributes: Vec<(String, String)>) -> Vec<KeyValue> {
    let mut new_attrs = GLOBAL_ATTRIBUTES.lock().clone();
    new_attrs.extend(attributes.into_iter().map(|(k, v)| KeyValue::new(k, v)));
    new_attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_attributes_appends_measurement_attrs() {
        let attrs = build_attributes(vec![("result".to_string(), "pass".to_string())]);
        assert!(
            attrs
                .iter()
                .any(|kv| kv.key.as_str() == "result" && kv.value.as_str() == "pass")
        );
    }
}
