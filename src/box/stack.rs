use tracing::warn;

use crate::r#box::{BoxHeader, BoxType, Error, Result};

/// Chain of currently open container boxes, outermost first.
///
/// Children report their full size to the innermost container when they
/// finish. A container that has seen all of its declared bytes is popped by
/// [`BoxStack::pop_complete`], which in turn credits its own parent, so a
/// single child can close several levels at once.
#[derive(Debug, Default)]
pub struct BoxStack {
    open: Vec<BoxHeader>,
}

impl BoxStack {
    pub fn push(&mut self, header: BoxHeader) {
        self.open.push(header);
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn contains(&self, r#type: BoxType) -> bool {
        self.open.iter().any(|header| header.r#type == r#type)
    }

    pub fn innermost(&self) -> Option<&BoxHeader> {
        self.open.last()
    }

    pub fn clear(&mut self) {
        self.open.clear();
    }

    /// Credits a finished child of `size` bytes to the innermost container.
    ///
    /// A child larger than what is left of its parent is clamped so that no
    /// container ever reports more bytes than it declared.
    pub fn credit(&mut self, size: u64) -> Result<()> {
        match self.open.last_mut() {
            Some(parent) => consume(parent, size),
            None => Ok(()),
        }
    }

    /// Pops the innermost container if it is complete and credits its size to
    /// the next one out. Call in a loop to unwind every finished level.
    pub fn pop_complete(&mut self) -> Option<BoxHeader> {
        if !self.open.last()?.is_complete() {
            return None;
        }
        let done = self.open.pop()?;
        if let Some(parent) = self.open.last_mut() {
            if let Err(error) = consume(parent, done.size) {
                warn!(%error, "malformed box nesting");
            }
        }
        Some(done)
    }
}

fn consume(parent: &mut BoxHeader, size: u64) -> Result<()> {
    let remaining = parent.remaining();
    if size > remaining {
        parent.consumed = parent.size;
        return Err(Error::ChildOverrun {
            r#type: parent.r#type.fourcc(),
            excess: size - remaining,
        });
    }
    parent.consumed += size;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(r#type: BoxType, size: u64, offset: u64) -> BoxHeader {
        BoxHeader::new(r#type, size, 8, offset)
    }

    #[test]
    fn nested_containers_close_together() {
        // moov > trak > mdia > minf > stbl > stsz(20)
        let mut stack = BoxStack::default();
        stack.push(container(BoxType::Moov, 60, 0));
        stack.push(container(BoxType::Trak, 52, 8));
        stack.push(container(BoxType::Mdia, 44, 16));
        stack.push(container(BoxType::Minf, 36, 24));
        stack.push(container(BoxType::Stbl, 28, 32));
        assert!(stack.pop_complete().is_none());

        stack.credit(20).unwrap();
        let mut closed = vec![];
        while let Some(done) = stack.pop_complete() {
            closed.push(done.r#type);
        }
        assert_eq!(
            closed,
            vec![
                BoxType::Stbl,
                BoxType::Minf,
                BoxType::Mdia,
                BoxType::Trak,
                BoxType::Moov,
            ]
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn partially_consumed_parent_stays_open() {
        let mut stack = BoxStack::default();
        stack.push(container(BoxType::Moov, 100, 0));
        stack.push(container(BoxType::Trak, 40, 8));
        stack.credit(32).unwrap();

        assert_eq!(stack.pop_complete().map(|h| h.r#type), Some(BoxType::Trak));
        assert!(stack.pop_complete().is_none());
        assert_eq!(stack.innermost().map(|h| h.consumed), Some(48));
    }

    #[test]
    fn empty_container_is_immediately_complete() {
        let mut stack = BoxStack::default();
        stack.push(container(BoxType::Moov, 100, 0));
        stack.push(container(BoxType::Stbl, 8, 8));
        assert_eq!(stack.pop_complete().map(|h| h.r#type), Some(BoxType::Stbl));
        assert_eq!(stack.innermost().map(|h| h.consumed), Some(16));
    }

    #[test]
    fn overrunning_child_is_clamped() {
        let mut stack = BoxStack::default();
        stack.push(container(BoxType::Minf, 20, 0));
        assert!(matches!(
            stack.credit(30),
            Err(Error::ChildOverrun { excess: 18, .. })
        ));
        let done = stack.pop_complete().unwrap();
        assert_eq!(done.consumed, done.size);
    }
}
