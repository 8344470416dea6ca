use super::FallbackProvider;
use crate::application::tooling::interface::ToolDescriptor;
use crate::domain::types::ToolPayload;
use serde_json::{Value, json};

pub const SEARCH_TOOL: &str = "airbnb_search";
pub const LISTING_DETAILS_TOOL: &str = "airbnb_listing_details";

/// The Airbnb listing worker does not answer `listTools`.
pub struct AirbnbFallback;

impl FallbackProvider for AirbnbFallback {
    fn kind(&self) -> &str {
        "airbnb"
    }

    fn catalog(&self) -> Option<Vec<ToolDescriptor>> {
        Some(vec![
            ToolDescriptor::new(SEARCH_TOOL, "Search for Airbnb listings", search_schema()),
            ToolDescriptor::new(
                LISTING_DETAILS_TOOL,
                "Get detailed information about a specific Airbnb listing",
                listing_details_schema(),
            ),
        ])
    }

    fn placeholder(&self, tool: &str, arguments: &Value) -> Option<ToolPayload> {
        match tool {
            SEARCH_TOOL => {
                let location = string_arg(arguments, "location");
                Some(ToolPayload::Structured(search_placeholder(location)))
            }
            LISTING_DETAILS_TOOL => {
                let id = string_arg(arguments, "id");
                Some(ToolPayload::Structured(listing_placeholder(id)))
            }
            _ => None,
        }
    }
}

fn string_arg<'a>(arguments: &'a Value, key: &str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or("Unknown")
}

fn property(kind: &str, description: &str) -> Value {
    json!({ "type": kind, "description": description })
}

fn guest_properties() -> serde_json::Map<String, Value> {
    let mut properties = serde_json::Map::new();
    properties.insert("checkin".into(), property("string", "Check-in date (YYYY-MM-DD)"));
    properties.insert("checkout".into(), property("string", "Check-out date (YYYY-MM-DD)"));
    properties.insert("adults".into(), property("number", "Number of adults"));
    properties.insert("children".into(), property("number", "Number of children"));
    properties.insert("infants".into(), property("number", "Number of infants"));
    properties.insert("pets".into(), property("number", "Number of pets"));
    properties.insert(
        "ignoreRobotsText".into(),
        property("boolean", "Whether to ignore robots.txt rules"),
    );
    properties
}

fn search_schema() -> Value {
    let mut properties = guest_properties();
    properties.insert("location".into(), property("string", "Location to search for"));
    properties.insert("placeId".into(), property("string", "Place ID for location"));
    properties.insert("minPrice".into(), property("number", "Minimum price"));
    properties.insert("maxPrice".into(), property("number", "Maximum price"));
    properties.insert("cursor".into(), property("string", "Pagination cursor"));
    json!({ "type": "object", "properties": properties, "required": ["location"] })
}

fn listing_details_schema() -> Value {
    let mut properties = guest_properties();
    properties.insert("id".into(), property("string", "Listing ID"));
    json!({ "type": "object", "properties": properties, "required": ["id"] })
}

fn search_placeholder(location: &str) -> Value {
    json!({
        "listings": [
            {
                "id": "12345",
                "name": format!("Cozy Apartment in {location}"),
                "price": "$150 per night",
                "rating": 4.8,
                "location": location,
                "description": format!("Beautiful apartment in the heart of {location}. Close to public transportation and tourist attractions."),
            },
            {
                "id": "67890",
                "name": format!("Luxury Condo in Downtown {location}"),
                "price": "$250 per night",
                "rating": 4.9,
                "location": location,
                "description": format!("Modern luxury condo with amazing views of {location}. Walking distance to restaurants and shops."),
            },
            {
                "id": "24680",
                "name": format!("Charming House in {location}"),
                "price": "$200 per night",
                "rating": 4.7,
                "location": location,
                "description": format!("Spacious house perfect for families visiting {location}. Quiet neighborhood with easy access to attractions."),
            }
        ],
        "total": 3,
        "location": location,
        "placeholder": true,
    })
}

fn listing_placeholder(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Detailed Listing Information",
        "price": "$200 per night",
        "rating": 4.8,
        "location": "San Francisco, CA",
        "description": format!("This is a detailed description of the listing with ID {id}"),
        "amenities": ["WiFi", "Kitchen", "Washer", "Dryer", "Air Conditioning", "Heating"],
        "bedrooms": 2,
        "bathrooms": 1,
        "max_guests": 4,
        "host": {
            "name": "John Doe",
            "rating": 4.9,
            "response_rate": "95%",
            "response_time": "within an hour"
        },
        "reviews": [
            { "user": "Alice", "rating": 5, "comment": "Great place, highly recommend!" },
            { "user": "Bob", "rating": 4, "comment": "Nice location, clean and comfortable." }
        ],
        "placeholder": true,
    })
}
