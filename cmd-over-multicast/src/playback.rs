//! Playback-status application served by the receiver binary.
//!
//! Tracks only whether playback is running; no audio is produced.  Commands
//! are matched case-insensitively and every command gets a text response.

use crate::sequencer::CommandHandler;

#[derive(Debug, Default)]
pub struct Playback {
    playing: bool,
}

impl Playback {
    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl CommandHandler for Playback {
    fn handle(&mut self, command: &str) -> String {
        let response = match command.to_uppercase().as_str() {
            "CONNECT" if self.playing => "Conectado - Audio ya se está reproduciendo",
            "CONNECT" => {
                self.playing = true;
                "Conectado - Reproduciendo audio automáticamente"
            }
            "PLAY" if self.playing => "El audio ya se está reproduciendo",
            "PLAY" => {
                self.playing = true;
                "Reproduciendo audio"
            }
            "PAUSE" if self.playing => {
                self.playing = false;
                "Audio pausado"
            }
            "PAUSE" => "El audio ya está pausado",
            "STOP" => {
                self.playing = false;
                "Audio detenido y reiniciado"
            }
            "RESTART" => {
                self.playing = true;
                "Audio reiniciado desde el inicio"
            }
            "STATUS" if self.playing => "Estado: Reproduciendo",
            "STATUS" => "Estado: Pausado",
            _ => return format!("Comando no reconocido: {command}"),
        };
        log::info!("[app] {command} -> {response}");
        response.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_pause_cycle() {
        let mut app = Playback::default();
        assert_eq!(app.handle("STATUS"), "Estado: Pausado");
        assert_eq!(app.handle("PLAY"), "Reproduciendo audio");
        assert_eq!(app.handle("PLAY"), "El audio ya se está reproduciendo");
        assert_eq!(app.handle("STATUS"), "Estado: Reproduciendo");
        assert_eq!(app.handle("PAUSE"), "Audio pausado");
        assert_eq!(app.handle("PAUSE"), "El audio ya está pausado");
        assert!(!app.is_playing());
    }

    #[test]
    fn stop_and_restart() {
        let mut app = Playback::default();
        app.handle("CONNECT");
        assert!(app.is_playing());
        assert_eq!(app.handle("STOP"), "Audio detenido y reiniciado");
        assert!(!app.is_playing());
        assert_eq!(app.handle("RESTART"), "Audio reiniciado desde el inicio");
        assert!(app.is_playing());
        assert_eq!(app.handle("connect"), "Conectado - Audio ya se está reproduciendo");
    }

    #[test]
    fn unknown_command_is_echoed() {
        let mut app = Playback::default();
        assert_eq!(app.handle("rewind"), "Comando no reconocido: rewind");
        assert!(!app.is_playing());
    }
}
