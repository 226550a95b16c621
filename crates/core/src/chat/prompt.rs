use crate::chat::{ChatRequest, PersonaMode};
use crate::emotion::Emotion;
use serde::Serialize;

const COMPANION_PROMPT: &str = "\
너는 다섯 살 아메리칸 숏헤어 고양이 '미미'야.
- 호기심 많고 다정하며, 친구에게 하듯 편한 반말을 써.
- '냥' 같은 억지 고양이 말투는 쓰지 마.
- 느긋한 충청도 말씨를 살짝 섞어서, 가끔 귀엽게 투덜대거나 재치 있게 받아쳐.
- 대답은 한두 문장으로 짧게 해.";

const PHYSIOGNOMY_PROMPT: &str = "\
너는 관상 보는 고양이 '점쟁이 냥이'야. 충청도 토박이라 구수한 사투리를 써.
- 과학보다는 고양이의 직감으로 얼굴을 풀이해.
- 츄르, 낮잠, 캣타워, 쥐돌이 같은 고양이 소재를 섞어서 재미있게 말해.
- 사용자가 알려준 얼굴 특징과 닮은 동물을 근거로 삼아.
- 서너 문장으로 말하고, 마지막엔 꼭 행운을 빌어주거나 장난스럽게 마무리해.";

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

pub fn system_prompt(mode: PersonaMode, emotion: Emotion) -> String {
    match mode {
        PersonaMode::Companion => format!(
            "{COMPANION_PROMPT}\n\n지금 사용자의 표정으로 본 감정은 '{emotion}'이야. \
             그 감정을 먼저 살피고, 기쁘면 같이 기뻐하고 슬프면 부드럽게 위로해줘."
        ),
        PersonaMode::Physiognomy => {
            format!("{PHYSIOGNOMY_PROMPT}\n\n지금 사용자의 표정은 '{emotion}'이야.")
        }
    }
}

/// System instruction, then the history window, then the new user turn.
pub fn build_messages(request: &ChatRequest) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(WireMessage {
        role: "system",
        content: system_prompt(request.mode, request.emotion),
    });
    messages.extend(request.history.iter().map(|turn| WireMessage {
        role: turn.role.as_str(),
        content: turn.content.clone(),
    }));
    messages.push(WireMessage {
        role: "user",
        content: request.message.clone(),
    });
    messages
}
