//! Hotel concierge skills exposed to the model as tools.
//!
//! Every skill answers through a focused sub-completion: its own persona, a
//! knowledge block, and the guest's request, with a small token budget.

use std::sync::Arc;

use async_trait::async_trait;
use nomad_common::{Error, Message, Result};
use nomad_config::HotelProfile;
use serde_json::{Value, json};
use tracing::info;

use crate::hotel::{builtin_profile, knowledge_block, language_name};
use crate::providers::{LlmProvider, LlmRequest};
use crate::retry::RetryPolicy;
use crate::tools::{Tool, ToolContext, ToolOutput};

const SKILL_MAX_TOKENS: u32 = 256;

#[derive(Debug, Clone, Copy)]
enum Knowledge {
    Static(&'static str),
    HotelFacts,
    Wifi,
}

/// Static description of one skill.
#[derive(Debug, Clone, Copy)]
struct SkillSpec {
    name: &'static str,
    description: &'static str,
    arg: &'static str,
    arg_description: &'static str,
    examples: &'static [&'static str],
    persona: &'static str,
    knowledge: Knowledge,
    action: &'static str,
}

const ROOM_SERVICE: SkillSpec = SkillSpec {
    name: "room_service",
    description: "Process room service orders for food and beverages",
    arg: "request",
    arg_description: "What the guest wants to order, including room number if given",
    examples: &[
        "I'd like to order breakfast",
        "Can I get room service?",
        "I want to order dinner to my room",
        "What's on the menu?",
        "I need food delivered to my room",
    ],
    persona: "You are a hotel room service assistant. Help guests order food and beverages. \
              Always confirm the order and room number before processing.",
    knowledge: Knowledge::Static(
        "Menu:\n- Breakfast: Continental, American, Japanese\n\
         - Lunch/Dinner: Burgers, Pasta, Local cuisine\n\
         - Beverages: Coffee, Tea, Soft drinks, Wine",
    ),
    action: "room_service_order",
};

const HOUSEKEEPING: SkillSpec = SkillSpec {
    name: "housekeeping",
    description: "Process housekeeping requests like extra towels, cleaning, pillows or laundry",
    arg: "request",
    arg_description: "The housekeeping request",
    examples: &[
        "Can I get extra towels?",
        "I need my room cleaned",
        "Please send housekeeping",
        "I need more pillows",
        "Can you clean my room now?",
    ],
    persona: "You are a hotel housekeeping coordinator. Confirm the request and give an \
              estimated time, usually 15-30 minutes.",
    knowledge: Knowledge::Static(
        "Services: extra towels and linens, room cleaning, toiletries, pillows and blankets, \
         laundry service.",
    ),
    action: "create_housekeeping_ticket",
};

const AMENITIES: SkillSpec = SkillSpec {
    name: "amenities_info",
    description: "Provide information about hotel amenities, hours, and facilities",
    arg: "query",
    arg_description: "The amenity question",
    examples: &[
        "What time does the pool close?",
        "Do you have a gym?",
        "When is breakfast served?",
        "Is there a spa?",
        "What amenities do you have?",
    ],
    persona: "You are a hotel information assistant. Provide accurate information about \
              hotel amenities using only the facts below.",
    knowledge: Knowledge::HotelFacts,
    action: "info_provided",
};

const WIFI: SkillSpec = SkillSpec {
    name: "wifi_help",
    description: "Provide WiFi credentials and help with connectivity issues",
    arg: "issue",
    arg_description: "The guest's WiFi question or connectivity problem",
    examples: &[
        "What's the WiFi password?",
        "How do I connect to WiFi?",
        "I can't connect to the internet",
        "WiFi not working",
        "What's the network name?",
    ],
    persona: "You are a hotel IT support assistant. Help guests connect to WiFi. For \
              connectivity issues suggest restarting the device, forgetting the network and \
              reconnecting, or contacting the front desk.",
    knowledge: Knowledge::Wifi,
    action: "wifi_credentials_provided",
};

const RECOMMENDATIONS: SkillSpec = SkillSpec {
    name: "local_recommendations",
    description: "Suggest local restaurants, attractions, and points of interest",
    arg: "query",
    arg_description: "What kind of place the guest is looking for",
    examples: &[
        "Where's good ramen nearby?",
        "Recommend a local restaurant",
        "What should I see in the area?",
        "Where can I get authentic food?",
        "Best coffee shop nearby?",
    ],
    persona: "You are a local expert and tour guide. Recommend authentic local places and \
              include the distance or walking time.",
    knowledge: Knowledge::Static(
        "Popular local spots:\n- Ramen: Ichiran (5 min walk), Ippudo (10 min walk)\n\
         - Sushi: Sushi Dai (15 min)\n- Coffee: Blue Bottle (3 min), Starbucks Reserve (8 min)\n\
         - Attractions: temple (10 min), museum (15 min)\n\
         - Shopping: local market (5 min), mall (20 min)\n- Parks: central park (7 min walk)",
    ),
    action: "recommendations_provided",
};

const ITINERARY: SkillSpec = SkillSpec {
    name: "itinerary_planning",
    description: "Create personalized day plans and itineraries",
    arg: "request",
    arg_description: "Available time and interests for the plan",
    examples: &[
        "Plan my day, I have 4 hours",
        "What should I do today?",
        "Create an itinerary for tomorrow",
        "I have half a day free, what to do?",
        "Plan a walking tour for me",
    ],
    persona: "You are a professional tour planner. Build an itinerary that fits the time \
              available, with timing and locations, as a bulleted list.",
    knowledge: Knowledge::Static(
        "Route templates:\n- 4-hour cultural tour: temple (1h), museum (1.5h), local lunch (1h), \
         market (30min)\n- Half-day food tour: breakfast spot, coffee, market tour, lunch\n\
         - Walking tour: park, historic district, shopping street, cafe\n\
         - Family-friendly: aquarium (2h), park (1h), kids restaurant",
    ),
    action: "itinerary_created",
};

const DIRECTIONS: SkillSpec = SkillSpec {
    name: "directions",
    description: "Help guests navigate to destinations with step-by-step directions",
    arg: "destination",
    arg_description: "Where the guest wants to go",
    examples: &[
        "How do I get to the station?",
        "Directions to the nearest subway",
        "How far is the temple?",
        "Best way to get to the airport?",
        "Walking directions to the museum",
    ],
    persona: "You are a navigation assistant. Give clear step-by-step directions with walking \
              time, transport options and landmarks. Prefer walking under 15 minutes.",
    knowledge: Knowledge::Static(
        "Common routes from the hotel:\n- Main station: 10 min walk east, or 5 min by subway\n\
         - Nearest subway: exit the hotel, turn right, 3 min walk\n\
         - Airport: 45 min by express train, or 60 min by bus\n\
         - Temple: 10 min walk north through the park\n\
         - Museum: 15 min walk, or 2 subway stops",
    ),
    action: "directions_provided",
};

const ALL_SKILLS: [SkillSpec; 7] = [
    ROOM_SERVICE,
    HOUSEKEEPING,
    AMENITIES,
    WIFI,
    RECOMMENDATIONS,
    ITINERARY,
    DIRECTIONS,
];

/// A concierge skill backed by a sub-completion on the shared provider.
pub struct HotelSkill {
    spec: SkillSpec,
    provider: Arc<dyn LlmProvider>,
    model: String,
    retry: RetryPolicy,
}

impl HotelSkill {
    fn system_prompt(&self, context: &ToolContext) -> String {
        let knowledge = match self.spec.knowledge {
            Knowledge::Static(text) => text.to_string(),
            Knowledge::HotelFacts => knowledge_block(&context.hotel),
            Knowledge::Wifi => wifi_block(&context.hotel),
        };
        format!(
            "{persona} Be concise (2-3 sentences).\n\n{knowledge}\n\nRespond in {language}.",
            persona = self.spec.persona,
            language = language_name(&context.language),
        )
    }
}

fn wifi_block(hotel: &HotelProfile) -> String {
    let fallback = builtin_profile();
    let network = if hotel.wifi_network.is_empty() {
        fallback.wifi_network
    } else {
        hotel.wifi_network.clone()
    };
    let password = if hotel.wifi_password.is_empty() {
        fallback.wifi_password
    } else {
        hotel.wifi_password.clone()
    };
    format!("WiFi network: {network}\nPassword: {password}")
}

#[async_trait]
impl Tool for HotelSkill {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                self.spec.arg: {
                    "type": "string",
                    "description": self.spec.arg_description
                }
            },
            "required": [self.spec.arg]
        })
    }

    fn example_utterances(&self) -> &[&'static str] {
        self.spec.examples
    }

    async fn execute(&self, context: &ToolContext, _args: Value) -> Result<ToolOutput> {
        if context.utterance.trim().is_empty() {
            return Err(Error::ToolExecution(format!(
                "missing '{}' argument",
                self.spec.arg
            )));
        }

        let mut request = LlmRequest::new(
            self.model.clone(),
            vec![
                Message::system(self.system_prompt(context)),
                Message::user(context.utterance.clone()),
            ],
        );
        request.max_tokens = Some(SKILL_MAX_TOKENS);

        let provider = Arc::clone(&self.provider);
        let response = self
            .retry
            .execute(self.spec.name, || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.complete(&request).await }
            })
            .await?;

        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(Error::ToolExecution("empty reply from model".to_string()));
        }

        info!(
            skill = self.spec.name,
            action = self.spec.action,
            session_id = %context.session_id,
            "skill completed"
        );
        Ok(ToolOutput::success(text).with_action(self.spec.action))
    }
}

/// The seven concierge skills, sharing one provider.
pub fn hotel_skills(
    provider: Arc<dyn LlmProvider>,
    model: &str,
    retry: RetryPolicy,
) -> Vec<Arc<dyn Tool>> {
    ALL_SKILLS
        .iter()
        .map(|spec| {
            Arc::new(HotelSkill {
                spec: *spec,
                provider: Arc::clone(&provider),
                model: model.to_string(),
                retry,
            }) as Arc<dyn Tool>
        })
        .collect()
}
