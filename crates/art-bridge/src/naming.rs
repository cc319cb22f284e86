//! Name mapping between schema names and SDK members
//!
//! Schema names are snake_case (`data_center`, `vms`); SDK classes and
//! accessors are CamelCase (`DataCenter`, `getVMs`). The automatic mapping
//! capitalizes each underscore-separated word. Acronyms and a few historic
//! spellings need the override table.

/// snake_case -> CamelCase exceptions
const OVERRIDES: &[(&str, &str)] = &[
    ("vm", "VM"),
    ("vms", "VMs"),
    ("vmpool", "VmPool"),
    ("vmpools", "VmPools"),
    ("cpu", "CPU"),
    ("cpus", "CPUs"),
    ("usb", "USB"),
    ("os", "OS"),
    ("nic", "NIC"),
    ("api", "API"),
    ("storage_domains", "StorageDomains"),
    ("high_availability", "HighAvailability"),
];

/// CamelCase for a snake_case name
pub fn to_camel(snake: &str) -> String {
    if let Some((_, camel)) = OVERRIDES.iter().find(|(s, _)| *s == snake) {
        return camel.to_string();
    }
    snake
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// snake_case for a CamelCase name
pub fn to_snake(camel: &str) -> String {
    if let Some((snake, _)) = OVERRIDES.iter().find(|(_, c)| *c == camel) {
        return snake.to_string();
    }
    let mut snake = String::with_capacity(camel.len() + 4);
    let chars: Vec<char> = camel.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && chars[i - 1].is_ascii_lowercase();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
        } else {
            snake.push(*c);
        }
    }
    snake
}

/// `getVMs` for `vms`
pub fn getter(attribute: &str) -> String {
    format!("get{}", to_camel(attribute))
}

/// `setMemory` for `memory`
pub fn setter(attribute: &str) -> String {
    format!("set{}", to_camel(attribute))
}

/// Attribute name behind a `getX` / `setX` / `isX` accessor
pub fn accessor_attribute(method: &str) -> Option<String> {
    let property = method
        .strip_prefix("get")
        .or_else(|| method.strip_prefix("set"))
        .or_else(|| method.strip_prefix("is"))?;
    match property.chars().next() {
        Some(first) if first.is_ascii_uppercase() => Some(to_snake(property)),
        _ => None,
    }
}

/// SDK method name for an action ("migrate", "commit_snapshot" -> "commitSnapshot")
pub fn action_method(action: &str) -> String {
    let camel = to_camel(action);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => camel,
    }
}
