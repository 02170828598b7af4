use crate::error::PreconditionViolation;
use crate::world::{LoaderPos, RegionCoord, WorldId};

/// One region kept resident on behalf of one loader device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadedRegion {
    region: RegionCoord,
    world: WorldId,
    requested_by: String,
    loader: LoaderPos,
}

impl LoadedRegion {
    /// Build a record, rejecting a blank requesting player
    pub fn new(
        region: RegionCoord,
        world: WorldId,
        requested_by: impl Into<String>,
        loader: LoaderPos,
    ) -> Result<Self, PreconditionViolation> {
        let requested_by = requested_by.into();
        if requested_by.trim().is_empty() {
            return Err(PreconditionViolation::BlankActor);
        }
        Ok(Self {
            region,
            world,
            requested_by,
            loader,
        })
    }

    pub fn region(&self) -> RegionCoord {
        self.region
    }

    pub fn world(&self) -> &WorldId {
        &self.world
    }

    /// Name of the player who placed the request
    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn loader(&self) -> LoaderPos {
        self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overworld() -> WorldId {
        WorldId::parse("world:overworld").expect("valid id")
    }

    #[test]
    fn test_blank_player_rejected() {
        for name in ["", "   ", "\t\n"] {
            let result =
                LoadedRegion::new(RegionCoord::new(0, 0), overworld(), name, LoaderPos::new(0, 64, 0));
            assert_eq!(result, Err(PreconditionViolation::BlankActor));
        }
    }

    #[test]
    fn test_accessors() {
        let record = LoadedRegion::new(
            RegionCoord::new(3, -1),
            overworld(),
            "alice",
            LoaderPos::new(50, 70, -10),
        )
        .expect("valid record");

        assert_eq!(record.region(), RegionCoord::new(3, -1));
        assert_eq!(record.world(), &overworld());
        assert_eq!(record.requested_by(), "alice");
        assert_eq!(record.loader(), LoaderPos::new(50, 70, -10));
    }
}
