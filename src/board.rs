//! Hardware resource wiring: the pins this crate actually needs, scoped
//! down to the two analog sense lines and the one relay output it drives.

use esp_hal::peripherals::*;

#[allow(non_snake_case)]
pub struct Board {
    pub CurrentSense: GPIO0<'static>,
    pub VoltageSense: GPIO1<'static>,
    pub Relay: GPIO8<'static>,
}

#[macro_export]
macro_rules! create_board {
    ($peripherals:expr) => {
        $crate::board::Board {
            CurrentSense: $peripherals.GPIO0,
            VoltageSense: $peripherals.GPIO1,
            Relay: $peripherals.GPIO8,
        }
    };
}
