/// 延迟销毁队列
///
/// 保存一组无参数的销毁动作，`flush` 时按照 push 的逆序执行（后创建的先销毁）。
///
/// 两种作用域：
/// - 进程级：只在退出时 flush 一次
/// - frame slot 级：每次复用这个 slot，在等待 fence 之后、录制之前 flush
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<Box<dyn FnOnce()>>,
    name: String,
}

// new & init
impl DeletionQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            name: name.into(),
        }
    }
}

// update
impl DeletionQueue {
    #[inline]
    pub fn push(&mut self, action: impl FnOnce() + 'static) {
        self.actions.push(Box::new(action));
    }

    /// 按照 LIFO 执行所有动作，然后清空
    ///
    /// 只处理 flush 开始时已经在队列中的动作，执行过程中新 push 的动作留到下一次
    pub fn flush(&mut self) {
        let actions = std::mem::take(&mut self.actions);
        if !actions.is_empty() {
            log::trace!("flush deletion queue [{}]: {} actions", self.name, actions.len());
        }
        for action in actions.into_iter().rev() {
            action();
        }
    }
}

// getters
impl DeletionQueue {
    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            log::warn!("deletion queue [{}] dropped with {} pending actions", self.name, self.actions.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn test_flush_is_lifo() {
        let order = Rc::new(RefCell::new(vec![]));
        let mut queue = DeletionQueue::new("test");
        for i in 0..4 {
            let order = order.clone();
            queue.push(move || order.borrow_mut().push(i));
        }
        assert_eq!(queue.len(), 4);

        queue.flush();

        assert_eq!(*order.borrow(), vec![3, 2, 1, 0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_twice_runs_each_action_once() {
        let count = Rc::new(RefCell::new(0));
        let mut queue = DeletionQueue::new("test");
        {
            let count = count.clone();
            queue.push(move || *count.borrow_mut() += 1);
        }

        queue.flush();
        queue.flush();

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_action_pushed_during_flush_waits_for_next_flush() {
        let queue = Rc::new(RefCell::new(DeletionQueue::new("test")));
        let order = Rc::new(RefCell::new(vec![]));

        {
            let order = order.clone();
            let inner_queue = queue.clone();
            queue.borrow_mut().push(move || {
                order.borrow_mut().push("outer");
                let order = order.clone();
                inner_queue.borrow_mut().push(move || order.borrow_mut().push("late"));
            });
        }

        // flush 期间不能持有 queue 的借用，先把动作取出来
        let mut pending = std::mem::take(&mut *queue.borrow_mut());
        pending.flush();
        assert_eq!(*order.borrow(), vec!["outer"]);
        assert_eq!(queue.borrow().len(), 1);

        queue.borrow_mut().flush();
        assert_eq!(*order.borrow(), vec!["outer", "late"]);
    }
}
