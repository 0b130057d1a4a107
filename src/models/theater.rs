use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenKind {
    #[serde(rename = "2D")]
    TwoD,
    #[serde(rename = "3D")]
    ThreeD,
    #[serde(rename = "IMAX")]
    Imax,
    #[serde(rename = "4DX")]
    FourDx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub id: String,
    pub name: String,
    pub total_seats: u32,
    #[serde(rename = "type")]
    pub kind: ScreenKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub city: String,
    pub district: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theater {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub screens: Vec<Screen>,
    pub distance: Option<String>,
}

impl Theater {
    pub fn screen(&self, screen_id: &str) -> Option<&Screen> {
        self.screens.iter().find(|s| s.id == screen_id)
    }
}
