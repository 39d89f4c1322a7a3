//! Weather backend backed by a static per-state table

use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::{required_arg, ToolError, ToolHandler, ToolServer};
use async_trait::async_trait;
use serde_json::{json, Value};

const FORECASTS: &[(&str, &str)] = &[
    ("california", "It's sunny and warm in California today with temperatures around 75°F. Perfect weather for outdoor activities!"),
    ("colorado", "Colorado has clear skies with temperatures around 65°F. Great conditions for hiking in the mountains!"),
    ("new york", "New York is experiencing partly cloudy weather with temperatures around 70°F. A pleasant day in the city!"),
    ("texas", "Texas has hot and humid weather today with temperatures around 85°F. Stay hydrated!"),
    ("florida", "Florida is warm and sunny with temperatures around 80°F. Perfect beach weather!"),
    ("washington", "Washington has overcast skies with light rain and temperatures around 60°F. Typical Pacific Northwest weather!"),
    ("alaska", "Alaska is cold with temperatures around 35°F. Bundle up if you're heading outside!"),
    ("hawaii", "Hawaii has beautiful tropical weather with temperatures around 82°F. Paradise conditions!"),
    ("arizona", "Arizona is hot and dry with temperatures around 90°F. Very sunny with clear skies!"),
    ("maine", "Maine has cool weather with temperatures around 55°F. Perfect for enjoying the coastal views!"),
];

pub fn server() -> ToolServer {
    ToolServer::new("Weather", env!("CARGO_PKG_VERSION")).with_tool(GetWeather)
}

/// Forecast for the first table entry contained in `location`
pub fn forecast(location: &str) -> String {
    let location = location.trim().to_lowercase();

    FORECASTS
        .iter()
        .find(|(state, _)| location.contains(state))
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| {
            format!(
                "The weather in {} is currently pleasant with moderate temperatures. For more accurate information, please check a local weather service.",
                title_case(&location)
            )
        })
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

struct GetWeather;

#[async_trait]
impl ToolHandler for GetWeather {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_weather".into(),
            description: Some("Get the weather for a specific location.".into()),
            input_schema: json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let location: String = required_arg(&arguments, "location")?;
        Ok(forecast(&location))
    }
}
